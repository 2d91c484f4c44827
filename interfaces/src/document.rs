use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::defs::{DocumentSource, Fragment, PageInfo};

/// On-disk shape of a captured page.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(flatten)]
    pub page: PageInfo,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

/// A document backed by a JSON snapshot file. `reload` swaps in the current
/// file contents; `discover` always answers from the last loaded snapshot.
pub struct SnapshotDocument {
    path: Option<PathBuf>,
    snapshot: RwLock<DocumentSnapshot>,
}

impl SnapshotDocument {
    pub fn new(snapshot: DocumentSnapshot) -> Self {
        Self {
            path: None,
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = read_snapshot(&path)?;
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(snapshot),
        })
    }

    pub fn reload(&self) -> Result<usize> {
        let path = self
            .path
            .as_ref()
            .context("snapshot document was not opened from a file")?;
        let snapshot = read_snapshot(path)?;
        let count = snapshot.fragments.len();
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        Ok(count)
    }

    pub fn replace(&self, snapshot: DocumentSnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    pub fn push_fragment(&self, fragment: Fragment) {
        self.snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .fragments
            .push(fragment);
    }
}

impl DocumentSource for SnapshotDocument {
    fn discover(&self) -> Vec<Fragment> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .fragments
            .clone()
    }

    fn page(&self) -> PageInfo {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .page
            .clone()
    }
}

fn read_snapshot(path: &Path) -> Result<DocumentSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading document snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing document snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{FragmentContext, FragmentId};
    use std::io::Write;

    const SNAPSHOT: &str = r#"{
        "url": "https://www.amazon.in/dp/B0CHX1W1XY",
        "document_title": "Amazon.in: Phone",
        "fragments": [
            {
                "id": "r1",
                "text": "Battery lasts two days, very happy",
                "context": { "text": "Reviewed in India on 5 August 2025", "fields": { "review-date": "5 August 2025" } }
            },
            { "id": "r2", "text": "Screen cracked within a week" }
        ]
    }"#;

    #[test]
    fn opens_and_reloads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let document = SnapshotDocument::open(file.path()).unwrap();
        let fragments = document.discover();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].context.field("review-date"), Some("5 August 2025"));
        assert_eq!(fragments[1].context, FragmentContext::default());
        assert_eq!(document.page().url, "https://www.amazon.in/dp/B0CHX1W1XY");

        let updated = SNAPSHOT.replace(r#"{ "id": "r2", "text": "Screen cracked within a week" }"#,
            r#"{ "id": "r2", "text": "Screen cracked within a week" }, { "id": "r3", "text": "Does the job for the price" }"#);
        std::fs::write(file.path(), updated).unwrap();
        assert_eq!(document.reload().unwrap(), 3);
        assert_eq!(document.discover()[2].id, FragmentId::new("r3"));
    }

    #[test]
    fn reload_without_a_file_is_an_error() {
        let document = SnapshotDocument::new(DocumentSnapshot::default());
        assert!(document.reload().is_err());
    }
}
