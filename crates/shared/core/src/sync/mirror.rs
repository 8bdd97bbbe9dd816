use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use super::{DiffVerdict, SequenceTracker, SyncStatus};
use crate::entities::{BookDiff, BookLevel, BookSnapshot, OrderBookEvent};
use crate::markets::TradingPair;
use crate::values::{Price, Size, UpdateId};

/// One pair's mirrored book
#[derive(Debug, Clone, Default)]
pub struct PairBook {
    bids: BTreeMap<Reverse<Price>, Size>,
    asks: BTreeMap<Price, Size>,
    sequence: SequenceTracker,
}

impl PairBook {
    fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        for level in snapshot.bids.iter().filter(|l| !l.is_removal()) {
            self.bids.insert(Reverse(level.price), level.size);
        }
        for level in snapshot.asks.iter().filter(|l| !l.is_removal()) {
            self.asks.insert(level.price, level.size);
        }
        self.sequence.on_snapshot(snapshot.update_id);
    }

    fn apply_diff(&mut self, diff: &BookDiff) -> DiffVerdict {
        let verdict = self.sequence.on_diff(diff.first_update_id, diff.update_id);
        if verdict != DiffVerdict::Apply {
            return verdict;
        }
        for level in &diff.bids {
            if level.is_removal() {
                self.bids.remove(&Reverse(level.price));
            } else {
                self.bids.insert(Reverse(level.price), level.size);
            }
        }
        for level in &diff.asks {
            if level.is_removal() {
                self.asks.remove(&level.price);
            } else {
                self.asks.insert(level.price, level.size);
            }
        }
        verdict
    }

    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids
            .iter()
            .next()
            .map(|(Reverse(price), size)| BookLevel::new(*price, *size))
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks
            .iter()
            .next()
            .map(|(price, size)| BookLevel::new(*price, *size))
    }

    pub fn bid_size(&self, price: Price) -> Option<Size> {
        self.bids.get(&Reverse(price)).copied()
    }

    pub fn ask_size(&self, price: Price) -> Option<Size> {
        self.asks.get(&price).copied()
    }

    /// Bids best first
    pub fn bids(&self) -> Vec<BookLevel> {
        self.bids
            .iter()
            .map(|(Reverse(price), size)| BookLevel::new(*price, *size))
            .collect()
    }

    /// Asks best first
    pub fn asks(&self) -> Vec<BookLevel> {
        self.asks
            .iter()
            .map(|(price, size)| BookLevel::new(*price, *size))
            .collect()
    }

    pub fn status(&self) -> SyncStatus {
        self.sequence.status()
    }

    pub fn last_update_id(&self) -> UpdateId {
        self.sequence.last_update_id()
    }
}

/// Multi-pair book mirror fed by `OrderBookEvent`s.
///
/// Trades pass through untouched. Diffs that break the sequencing contract
/// leave the book as it was and flag the pair until the next snapshot.
#[derive(Debug, Default)]
pub struct BookMirror {
    books: HashMap<TradingPair, PairBook>,
}

impl BookMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the diff verdict, or `None` for snapshots and trades
    pub fn apply(&mut self, event: &OrderBookEvent) -> Option<DiffVerdict> {
        match event {
            OrderBookEvent::Snapshot(snapshot) => {
                self.books
                    .entry(snapshot.trading_pair.clone())
                    .or_default()
                    .apply_snapshot(snapshot);
                None
            }
            OrderBookEvent::Diff(diff) => {
                let book = self.books.entry(diff.trading_pair.clone()).or_default();
                Some(book.apply_diff(diff))
            }
            OrderBookEvent::Trade(_) => None,
        }
    }

    pub fn book(&self, pair: &TradingPair) -> Option<&PairBook> {
        self.books.get(pair)
    }

    pub fn is_desynced(&self, pair: &TradingPair) -> bool {
        self.books
            .get(pair)
            .is_some_and(|b| b.status() == SyncStatus::Desynced)
    }

    /// Pairs waiting for a snapshot (never snapshotted or desynced)
    pub fn pairs_needing_snapshot(&self) -> Vec<TradingPair> {
        self.books
            .iter()
            .filter(|(_, book)| book.status().needs_snapshot())
            .map(|(pair, _)| pair.clone())
            .collect()
    }
}
