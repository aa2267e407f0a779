//! Wait-for graph used for deadlock detection.

use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Edge `a -> b` means transaction `a` waits for a lock held (or queued
/// ahead of it) by `b`. The graph is kept acyclic: an edge that would close a
/// cycle is never inserted.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `waiter -> holder` would close a cycle, i.e. `waiter` is
    /// already reachable from `holder`.
    pub fn would_cause_deadlock(&self, waiter: TransactionId, holder: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(holder);

        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.edges.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }

        false
    }

    /// Replaces the outgoing edges of `waiter`.
    pub fn set_waits(&mut self, waiter: TransactionId, holders: &[TransactionId]) {
        if holders.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, holders.iter().copied().collect());
        }
    }

    /// Drops the outgoing edges of `waiter`, once it stops waiting.
    pub fn clear_waits(&mut self, waiter: TransactionId) {
        self.edges.remove(&waiter);
    }

    /// Removes every edge from or to `tid`.
    pub fn remove_transaction(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
        for holders in self.edges.values_mut() {
            holders.remove(&tid);
        }
        self.edges.retain(|_, holders| !holders.is_empty());
    }

    pub fn waits_for(&self, waiter: TransactionId) -> Vec<TransactionId> {
        let mut holders: Vec<_> = self
            .edges
            .get(&waiter)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn test_direct_cycle() {
        let mut graph = WaitForGraph::new();
        assert!(!graph.would_cause_deadlock(t(1), t(2)));
        graph.set_waits(t(1), &[t(2)]);

        assert!(graph.would_cause_deadlock(t(2), t(1)));
        assert!(!graph.would_cause_deadlock(t(3), t(1)));
    }

    #[test]
    fn test_transitive_cycle() {
        let mut graph = WaitForGraph::new();
        graph.set_waits(t(1), &[t(2)]);
        graph.set_waits(t(2), &[t(3), t(4)]);

        assert!(graph.would_cause_deadlock(t(4), t(1)));
        assert!(graph.would_cause_deadlock(t(3), t(2)));
        assert!(!graph.would_cause_deadlock(t(1), t(4)));
    }

    #[test]
    fn test_self_wait_is_a_cycle() {
        let graph = WaitForGraph::new();
        assert!(graph.would_cause_deadlock(t(1), t(1)));
    }

    #[test]
    fn test_remove_transaction() {
        let mut graph = WaitForGraph::new();
        graph.set_waits(t(1), &[t(2)]);
        graph.set_waits(t(3), &[t(2), t(1)]);

        graph.remove_transaction(t(2));
        assert!(graph.waits_for(t(1)).is_empty());
        assert_eq!(graph.waits_for(t(3)), vec![t(1)]);

        graph.remove_transaction(t(1));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_set_waits_replaces() {
        let mut graph = WaitForGraph::new();
        graph.set_waits(t(1), &[t(2), t(3)]);
        graph.set_waits(t(1), &[t(4)]);
        assert_eq!(graph.waits_for(t(1)), vec![t(4)]);

        graph.clear_waits(t(1));
        assert!(graph.is_empty());
    }
}
