//! Updatable max-priority queue over unknown indices
//!
//! Greedy coarsening repeatedly picks the unknown with the highest measure
//! while measures of its neighbourhood change. Entries are kept in an ordered
//! set keyed by `(Reverse(priority), index)`, so the maximum priority comes
//! first and ties resolve to the lowest index independently of update order.

use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Max-priority queue with increase/decrease and stable index tie-breaking
#[derive(Debug, Clone)]
pub struct PriorityQueue {
    ordered: BTreeSet<(Reverse<usize>, usize)>,
    priority: Vec<Option<usize>>,
}

impl PriorityQueue {
    /// Queue containing every index `i` with priority `priorities[i]`
    pub fn new(priorities: &[usize]) -> Self {
        Self {
            ordered: priorities
                .iter()
                .enumerate()
                .map(|(i, &p)| (Reverse(p), i))
                .collect(),
            priority: priorities.iter().copied().map(Some).collect(),
        }
    }

    /// Number of queued indices
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Whether `i` is still queued
    pub fn contains(&self, i: usize) -> bool {
        self.priority[i].is_some()
    }

    /// Current priority of `i`, if queued
    pub fn priority(&self, i: usize) -> Option<usize> {
        self.priority[i]
    }

    /// Highest-priority entry without removing it
    pub fn peek(&self) -> Option<(usize, usize)> {
        self.ordered.first().map(|&(Reverse(p), i)| (i, p))
    }

    /// Remove and return the highest-priority entry as `(index, priority)`
    pub fn pop(&mut self) -> Option<(usize, usize)> {
        let (Reverse(p), i) = self.ordered.pop_first()?;
        self.priority[i] = None;
        Some((i, p))
    }

    /// Remove `i` from the queue; no-op if already removed
    pub fn remove(&mut self, i: usize) {
        if let Some(p) = self.priority[i].take() {
            self.ordered.remove(&(Reverse(p), i));
        }
    }

    /// Set the priority of a queued index; no-op if `i` is not queued
    pub fn set(&mut self, i: usize, new_priority: usize) {
        if let Some(p) = self.priority[i] {
            if p != new_priority {
                self.ordered.remove(&(Reverse(p), i));
                self.ordered.insert((Reverse(new_priority), i));
                self.priority[i] = Some(new_priority);
            }
        }
    }

    /// Increase the priority of a queued index by one
    pub fn increment(&mut self, i: usize) {
        if let Some(p) = self.priority[i] {
            self.set(i, p + 1);
        }
    }

    /// Decrease the priority of a queued index by one (saturating at zero)
    pub fn decrement(&mut self, i: usize) {
        if let Some(p) = self.priority[i] {
            self.set(i, p.saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_order_and_ties() {
        let mut q = PriorityQueue::new(&[2, 5, 5, 1]);
        assert_eq!(q.pop(), Some((1, 5)));
        assert_eq!(q.pop(), Some((2, 5)));
        assert_eq!(q.pop(), Some((0, 2)));
        assert_eq!(q.pop(), Some((3, 1)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_updates_reorder() {
        let mut q = PriorityQueue::new(&[3, 3, 3]);
        q.increment(2);
        assert_eq!(q.peek(), Some((2, 4)));

        q.decrement(2);
        q.decrement(2);
        assert_eq!(q.peek(), Some((0, 3)));
        assert_eq!(q.priority(2), Some(2));
    }

    #[test]
    fn test_remove_and_contains() {
        let mut q = PriorityQueue::new(&[1, 0, 4]);
        q.remove(2);
        assert!(!q.contains(2));
        assert_eq!(q.len(), 2);

        // Updates on removed entries are ignored
        q.increment(2);
        assert_eq!(q.priority(2), None);
        assert_eq!(q.pop(), Some((0, 1)));
    }

    #[test]
    fn test_decrement_saturates() {
        let mut q = PriorityQueue::new(&[0]);
        q.decrement(0);
        assert_eq!(q.priority(0), Some(0));
        assert!(!q.is_empty());
    }
}
