//! Discovery frontier
//!
//! A FIFO queue of category ids awaiting a probe. An id is never queued twice
//! at the same time, and ids already visited are refused.

use std::collections::{HashSet, VecDeque};

/// Queue of category ids awaiting a probe
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    queue: VecDeque<String>,
    queued: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a frontier from a persisted snapshot, dropping duplicates
    pub fn from_snapshot<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut frontier = Self::new();
        for id in ids {
            frontier.push(id);
        }
        frontier
    }

    /// Enqueues an id unless it is already waiting
    ///
    /// Returns true if the id was added.
    pub fn push(&mut self, id: String) -> bool {
        if self.queued.contains(&id) {
            return false;
        }
        self.queued.insert(id.clone());
        self.queue.push_back(id);
        true
    }

    /// Enqueues an id unless it is waiting or in `visited`
    pub fn push_unvisited(&mut self, id: String, visited: &HashSet<String>) -> bool {
        if visited.contains(&id) {
            return false;
        }
        self.push(id)
    }

    /// Puts an id back at the head of the queue
    pub fn push_front(&mut self, id: String) {
        if self.queued.insert(id.clone()) {
            self.queue.push_front(id);
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        let id = self.queue.pop_front()?;
        self.queued.remove(&id);
        Some(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.queued.contains(id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue contents in pop order
    pub fn snapshot(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }
}
