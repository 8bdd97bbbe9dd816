mod mirror;
mod sequence;

pub use mirror::{BookMirror, PairBook};
pub use sequence::{DiffVerdict, SequenceTracker, SyncStatus};
