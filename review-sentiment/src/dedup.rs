use crate::types::{Fragment, FragmentId, FragmentMetadata, Prediction};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Pipeline-owned bookkeeping for a fragment. Any state at all counts as the
/// dedup marker.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentState {
    /// Claimed by a run that has not labeled it yet.
    InFlight,
    Labeled {
        prediction: Prediction,
        metadata: FragmentMetadata,
    },
}

pub struct DedupFilter;

impl DedupFilter {
    /// Keep fragments for which `is_marked` is false, in input order. A
    /// fragment id repeated within `fragments` is only returned once.
    pub fn filter<F>(fragments: Vec<Fragment>, is_marked: F) -> Vec<Fragment>
    where
        F: Fn(&FragmentId) -> bool,
    {
        let mut seen = HashSet::new();
        fragments
            .into_iter()
            .filter(|fragment| !is_marked(&fragment.id))
            .filter(|fragment| seen.insert(fragment.id.clone()))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct FragmentLedger {
    states: Arc<RwLock<HashMap<FragmentId, FragmentState>>>,
}

impl FragmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unmarked fragments without claiming them.
    pub async fn unmarked(&self, fragments: Vec<Fragment>) -> Vec<Fragment> {
        let states = self.states.read().await;
        DedupFilter::filter(fragments, |id| states.contains_key(id))
    }

    /// Filter and mark every returned fragment in-flight under one lock, so a
    /// concurrent run can never observe the same fragment as unmarked.
    pub async fn claim(&self, fragments: Vec<Fragment>) -> Vec<Fragment> {
        let mut states = self.states.write().await;
        let fresh = DedupFilter::filter(fragments, |id| states.contains_key(id));
        for fragment in &fresh {
            states.insert(fragment.id.clone(), FragmentState::InFlight);
        }
        debug!("Claimed {} fragments ({} tracked)", fresh.len(), states.len());
        fresh
    }

    pub async fn mark_labeled(&self, id: &FragmentId, prediction: Prediction, metadata: FragmentMetadata) {
        let mut states = self.states.write().await;
        let previous = states.insert(id.clone(), FragmentState::Labeled { prediction, metadata });
        if let Some(FragmentState::Labeled { .. }) = previous {
            warn!("Fragment {} was labeled twice", id);
        }
    }

    pub async fn is_marked(&self, id: &FragmentId) -> bool {
        self.states.read().await.contains_key(id)
    }

    pub async fn state(&self, id: &FragmentId) -> Option<FragmentState> {
        self.states.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    pub async fn in_flight(&self) -> usize {
        self.states
            .read()
            .await
            .values()
            .filter(|state| matches!(state, FragmentState::InFlight))
            .count()
    }
}
