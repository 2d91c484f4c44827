pub mod defs;
pub mod document;

pub use defs::{
    ChangeSignal, DocumentSource, Fragment, FragmentContext, FragmentId, Highlighter,
    NoopHighlighter, PageInfo, VisualCategory,
};
pub use document::{DocumentSnapshot, SnapshotDocument};
