//! Process-wide record of finished games
//!
//! The leaderboard is the only state shared by every session. Writers take
//! the lock for the whole append, sort and truncate step so a concurrent
//! `snapshot` never sees a half-sorted or over-long list.

use shared::LeaderboardEntry;
use std::sync::{PoisonError, RwLock};

#[derive(Debug)]
pub struct Leaderboard {
    max_entries: usize,
    entries: RwLock<Vec<LeaderboardEntry>>,
}

impl Leaderboard {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: RwLock::new(Vec::with_capacity(max_entries + 1)),
        }
    }

    /// Inserts a result, keeping entries sorted by descending score
    ///
    /// The sort is stable, so among equal scores earlier results stay ahead.
    pub fn record(&self, entry: LeaderboardEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry);
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(self.max_entries);
    }

    pub fn snapshot(&self) -> Vec<LeaderboardEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
