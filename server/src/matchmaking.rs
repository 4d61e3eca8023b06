//! FIFO queue of players waiting for an opponent

use crate::ConnectionId;
use log::info;
use std::collections::VecDeque;

/// A player who asked to join and has not been paired yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub id: ConnectionId,
    pub name: String,
}

impl WaitingEntry {
    pub fn new(id: ConnectionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Pairs waiting players in arrival order
///
/// Entries leave the queue exactly once, either through `try_pair_next` or
/// through `remove`, so an entry can never be both paired and removed.
#[derive(Debug, Default)]
pub struct MatchQueue {
    waiting: VecDeque<WaitingEntry>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self {
            waiting: VecDeque::new(),
        }
    }

    /// Appends an entry and returns the resulting queue length
    pub fn enqueue(&mut self, entry: WaitingEntry) -> usize {
        info!("{} (client {}) is waiting for a game", entry.name, entry.id);
        self.waiting.push_back(entry);
        self.waiting.len()
    }

    /// Takes the two oldest entries once at least two are waiting
    pub fn try_pair_next(&mut self) -> Option<(WaitingEntry, WaitingEntry)> {
        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?;
        let second = self.waiting.pop_front()?;
        Some((first, second))
    }

    /// Drops the entry for `id` if it is still waiting
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        match self.waiting.iter().position(|entry| entry.id == id) {
            Some(index) => {
                self.waiting.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.waiting.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
