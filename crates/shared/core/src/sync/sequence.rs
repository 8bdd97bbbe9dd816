//! Snapshot/diff sequencing contract.
//!
//! A snapshot resets the book at its `update_id`. A diff covers the id range
//! `first_update_id..=update_id` and may only extend the book: it must start
//! right after the last applied id. The first diff after a snapshot is allowed
//! to straddle the snapshot id, since venues stream diffs independently of the
//! REST endpoint serving snapshots.

use crate::values::UpdateId;

/// Synchronization state of one pair's mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No snapshot seen yet
    AwaitingSnapshot,
    /// Snapshot applied, no diff applied since
    Bridging,
    /// Diffs applied contiguously since the last snapshot
    Synced,
    /// Regression or gap seen; only a snapshot recovers
    Desynced,
}

impl SyncStatus {
    /// Check if the book is consistent with the exchange
    pub fn is_ready(&self) -> bool {
        matches!(self, SyncStatus::Bridging | SyncStatus::Synced)
    }

    /// Check if the pair needs a snapshot
    pub fn needs_snapshot(&self) -> bool {
        matches!(self, SyncStatus::AwaitingSnapshot | SyncStatus::Desynced)
    }
}

/// What to do with a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffVerdict {
    Apply,
    /// Already covered by the snapshot
    Stale,
    /// Dropped while no consistent book exists
    Discard,
    /// Starts at or before the last applied id; desynchronizes
    Regression { last_update_id: UpdateId, first_update_id: UpdateId },
    /// Skips ids after the last applied one; desynchronizes
    Gap { expected: UpdateId, first_update_id: UpdateId },
}

impl DiffVerdict {
    pub fn is_desync(&self) -> bool {
        matches!(self, DiffVerdict::Regression { .. } | DiffVerdict::Gap { .. })
    }
}

/// Per-pair tracker for the last applied update id
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    status: SyncStatus,
    last_update_id: UpdateId,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self {
            status: SyncStatus::AwaitingSnapshot,
            last_update_id: 0,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn last_update_id(&self) -> UpdateId {
        self.last_update_id
    }

    /// A snapshot always replaces the book, whatever came before
    pub fn on_snapshot(&mut self, update_id: UpdateId) {
        self.last_update_id = update_id;
        self.status = SyncStatus::Bridging;
    }

    /// Judge a diff without changing state
    pub fn check(&self, first_update_id: UpdateId, update_id: UpdateId) -> DiffVerdict {
        let last = self.last_update_id;
        let expected = last + 1;
        match self.status {
            SyncStatus::AwaitingSnapshot | SyncStatus::Desynced => DiffVerdict::Discard,
            SyncStatus::Bridging => {
                if update_id <= last {
                    DiffVerdict::Stale
                } else if first_update_id > expected {
                    DiffVerdict::Gap {
                        expected,
                        first_update_id,
                    }
                } else {
                    DiffVerdict::Apply
                }
            }
            SyncStatus::Synced => {
                if first_update_id <= last {
                    DiffVerdict::Regression {
                        last_update_id: last,
                        first_update_id,
                    }
                } else if first_update_id > expected {
                    DiffVerdict::Gap {
                        expected,
                        first_update_id,
                    }
                } else {
                    DiffVerdict::Apply
                }
            }
        }
    }

    /// Judge a diff and record the outcome
    pub fn on_diff(&mut self, first_update_id: UpdateId, update_id: UpdateId) -> DiffVerdict {
        let verdict = self.check(first_update_id, update_id);
        match verdict {
            DiffVerdict::Apply => {
                self.last_update_id = update_id;
                self.status = SyncStatus::Synced;
            }
            v if v.is_desync() => self.status = SyncStatus::Desynced,
            _ => {}
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_before_snapshot_is_discarded() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.on_diff(1, 2), DiffVerdict::Discard);
        assert_eq!(tracker.status(), SyncStatus::AwaitingSnapshot);
    }

    #[test]
    fn test_contiguous_diffs_apply() {
        let mut tracker = SequenceTracker::new();
        tracker.on_snapshot(100);
        assert_eq!(tracker.on_diff(101, 102), DiffVerdict::Apply);
        assert_eq!(tracker.on_diff(103, 103), DiffVerdict::Apply);
        assert_eq!(tracker.last_update_id(), 103);
        assert!(tracker.status().is_ready());
    }

    #[test]
    fn test_first_diff_may_straddle_snapshot() {
        let mut tracker = SequenceTracker::new();
        tracker.on_snapshot(100);
        assert_eq!(tracker.on_diff(90, 95), DiffVerdict::Stale);
        assert_eq!(tracker.on_diff(96, 105), DiffVerdict::Apply);
        assert_eq!(tracker.last_update_id(), 105);
    }

    #[test]
    fn test_regression_desyncs_until_snapshot() {
        let mut tracker = SequenceTracker::new();
        tracker.on_snapshot(95);
        tracker.on_diff(96, 100);

        let verdict = tracker.on_diff(50, 55);
        assert_eq!(
            verdict,
            DiffVerdict::Regression {
                last_update_id: 100,
                first_update_id: 50
            }
        );
        assert_eq!(tracker.status(), SyncStatus::Desynced);
        assert_eq!(tracker.last_update_id(), 100);
        assert_eq!(tracker.on_diff(101, 101), DiffVerdict::Discard);

        tracker.on_snapshot(120);
        assert_eq!(tracker.on_diff(121, 121), DiffVerdict::Apply);
    }

    #[test]
    fn test_gap_desyncs() {
        let mut tracker = SequenceTracker::new();
        tracker.on_snapshot(100);
        let verdict = tracker.on_diff(105, 106);
        assert!(verdict.is_desync());
        assert!(tracker.status().needs_snapshot());
    }
}
