//! Score-sorted node containers.
//!
//! [`NodeArray`] is the workhorse of neighbor bookkeeping: a pair of
//! parallel arrays (ordinals, scores) kept sorted by score descending and
//! unique by ordinal. Adjacency snapshots, pruning candidates, and merge
//! results are all `NodeArray`s.

use bitvec::slice::BitSlice;
use thiserror::Error;

/// An append violated the non-increasing score order.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("out-of-order append: score {score} exceeds the current tail score {tail}")]
pub struct OutOfOrder {
    /// Score of the rejected append.
    pub score: f32,
    /// Score of the current last entry.
    pub tail: f32,
}

/// Parallel (ordinal, score) arrays, score-descending, unique ordinals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeArray {
    ordinals: Vec<u32>,
    scores: Vec<f32>,
}

impl NodeArray {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty array with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ordinals: Vec::with_capacity(capacity),
            scores: Vec::with_capacity(capacity),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    /// Whether the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Ordinal at position `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn node(&self, idx: usize) -> u32 {
        self.ordinals[idx]
    }

    /// Score at position `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    #[must_use]
    pub fn score(&self, idx: usize) -> f32 {
        self.scores[idx]
    }

    /// Iterates `(ordinal, score)` pairs in score-descending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.ordinals.iter().copied().zip(self.scores.iter().copied())
    }

    /// Whether `node` appears in the array.
    #[must_use]
    pub fn contains(&self, node: u32) -> bool {
        self.ordinals.contains(&node)
    }

    /// Appends an entry that must not exceed the current tail score.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfOrder`] if `score` is greater than the score of the
    /// current last entry. The array is unchanged on error.
    pub fn add_in_order(&mut self, node: u32, score: f32) -> Result<(), OutOfOrder> {
        if let Some(&tail) = self.scores.last() {
            if score > tail {
                return Err(OutOfOrder { score, tail });
            }
        }
        self.ordinals.push(node);
        self.scores.push(score);
        Ok(())
    }

    /// Inserts an entry at its sorted position.
    ///
    /// If an entry with the same ordinal already exists the call is a
    /// no-op, even when the scores differ. Returns `true` if the entry was
    /// inserted.
    pub fn insert_sorted(&mut self, node: u32, score: f32) -> bool {
        if self.contains(node) {
            return false;
        }
        let at = self.insertion_point(score);
        self.ordinals.insert(at, node);
        self.scores.insert(at, score);
        true
    }

    /// Removes the entry at position `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn remove_index(&mut self, idx: usize) {
        self.ordinals.remove(idx);
        self.scores.remove(idx);
    }

    /// Removes the last (lowest-scoring) entry, returning it.
    pub fn remove_last(&mut self) -> Option<(u32, f32)> {
        match (self.ordinals.pop(), self.scores.pop()) {
            (Some(n), Some(s)) => Some((n, s)),
            _ => None,
        }
    }

    /// Compacts in place, keeping only positions whose bit is set.
    ///
    /// Positions beyond the end of `keep` are dropped. Relative order is
    /// preserved.
    pub fn retain(&mut self, keep: &BitSlice) {
        let mut write = 0;
        for read in 0..self.ordinals.len() {
            if keep.get(read).is_some_and(|b| *b) {
                self.ordinals.swap(write, read);
                self.scores.swap(write, read);
                write += 1;
            }
        }
        self.ordinals.truncate(write);
        self.scores.truncate(write);
    }

    /// Truncates to at most `len` entries, dropping the lowest scores.
    pub fn truncate(&mut self, len: usize) {
        self.ordinals.truncate(len);
        self.scores.truncate(len);
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.ordinals.clear();
        self.scores.clear();
    }

    /// Merge-sorts two arrays, unique by ordinal, first occurrence wins.
    ///
    /// Both inputs must already be sorted; the result is sorted and has at
    /// most `a.len() + b.len()` entries.
    #[must_use]
    pub fn merge(a: &NodeArray, b: &NodeArray) -> NodeArray {
        let mut out = NodeArray::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() || j < b.len() {
            // Pick the higher-scoring head; ties prefer `a`.
            let from_a = match (i < a.len(), j < b.len()) {
                (true, true) => a.scores[i] >= b.scores[j],
                (true, false) => true,
                (false, true) => false,
                (false, false) => unreachable!(),
            };
            let (node, score) = if from_a {
                let e = (a.ordinals[i], a.scores[i]);
                i += 1;
                e
            } else {
                let e = (b.ordinals[j], b.scores[j]);
                j += 1;
                e
            };
            if !out.contains(node) {
                out.ordinals.push(node);
                out.scores.push(score);
            }
        }
        out
    }

    /// First position whose score is strictly below `score`.
    ///
    /// Equal scores insert after the existing run, so earlier entries win
    /// ties.
    fn insertion_point(&self, score: f32) -> usize {
        self.scores
            .partition_point(|&s| s >= score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitvec::prelude::*;

    #[test]
    fn test_add_in_order_accepts_non_increasing() {
        let mut a = NodeArray::new();
        a.add_in_order(1, 0.9).unwrap();
        a.add_in_order(2, 0.9).unwrap();
        a.add_in_order(3, 0.5).unwrap();
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_add_in_order_rejects_increase() {
        let mut a = NodeArray::new();
        a.add_in_order(1, 0.5).unwrap();
        let err = a.add_in_order(2, 0.6).unwrap_err();
        assert_eq!(err.tail, 0.5);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_insert_sorted_keeps_order() {
        let mut a = NodeArray::new();
        assert!(a.insert_sorted(10, 0.3));
        assert!(a.insert_sorted(11, 0.9));
        assert!(a.insert_sorted(12, 0.6));
        let nodes: Vec<u32> = a.iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![11, 12, 10]);
    }

    #[test]
    fn test_insert_sorted_dedups_on_ordinal() {
        let mut a = NodeArray::new();
        assert!(a.insert_sorted(7, 0.5));
        // Same ordinal, different score: must be a no-op.
        assert!(!a.insert_sorted(7, 0.99));
        assert_eq!(a.len(), 1);
        assert!((a.score(0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_remove_last_and_index() {
        let mut a = NodeArray::new();
        a.insert_sorted(1, 0.9);
        a.insert_sorted(2, 0.8);
        a.insert_sorted(3, 0.7);
        assert_eq!(a.remove_last(), Some((3, 0.7)));
        a.remove_index(0);
        assert_eq!(a.node(0), 2);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_retain_positions() {
        let mut a = NodeArray::new();
        a.insert_sorted(1, 0.9);
        a.insert_sorted(2, 0.8);
        a.insert_sorted(3, 0.7);
        a.insert_sorted(4, 0.6);
        let keep = bitvec![1, 0, 1, 0];
        a.retain(&keep);
        let nodes: Vec<u32> = a.iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![1, 3]);
    }

    #[test]
    fn test_merge_sorted_unique() {
        let mut a = NodeArray::new();
        a.insert_sorted(1, 0.9);
        a.insert_sorted(2, 0.7);
        let mut b = NodeArray::new();
        b.insert_sorted(3, 0.8);
        b.insert_sorted(2, 0.6); // duplicate ordinal, lower score
        b.insert_sorted(4, 0.5);
        let m = NodeArray::merge(&a, &b);
        let nodes: Vec<u32> = m.iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![1, 3, 2, 4]);
        // First occurrence of ordinal 2 (score 0.7) wins.
        assert!((m.score(2) - 0.7).abs() < f32::EPSILON);
        // Scores non-increasing.
        for w in m.iter().collect::<Vec<_>>().windows(2) {
            assert!(w[0].1 >= w[1].1);
        }
    }
}
