//! Per-node adjacency with atomic snapshot replace.
//!
//! Each node's neighbor list is an immutable [`Neighbors`] snapshot behind
//! a per-node lock. Readers clone the `Arc` and never observe torn data; a
//! reader may see a snapshot that a concurrent insert has already replaced,
//! which is acceptable because the pruned-out edge was either diverse-bad
//! or gets re-added by a later insert.

use super::node_array::NodeArray;
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable adjacency snapshot for one node.
///
/// Entries are sorted by score descending, unique by ordinal, and never
/// contain the owning node itself. `short_edges` counts the neighbors whose
/// score is within the diversity factor of the best neighbor; it is
/// recomputed on every commit and serves as a graph quality metric.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    array: NodeArray,
    short_edges: usize,
}

impl Neighbors {
    /// An empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a sorted array, counting short edges under `alpha`.
    #[must_use]
    pub fn from_array(array: NodeArray, alpha: f32) -> Self {
        let short_edges = if array.is_empty() {
            0
        } else {
            let best = array.score(0);
            (0..array.len())
                .take_while(|&i| array.score(i) * alpha >= best)
                .count()
        };
        Self { array, short_edges }
    }

    /// The underlying sorted (ordinal, score) entries.
    #[must_use]
    pub fn array(&self) -> &NodeArray {
        &self.array
    }

    /// Number of neighbors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Whether there are no neighbors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Neighbors whose score is within the diversity factor of the best.
    #[must_use]
    pub fn short_edges(&self) -> usize {
        self.short_edges
    }

    /// Iterates neighbor ordinals, best first.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.array.iter()
    }
}

/// Diversity pruning.
///
/// `candidates` are (node, score-to-p) pairs sorted by score descending.
/// Walking best-first, a candidate `c` is kept only if no already-kept
/// neighbor `r` satisfies `score(r, c) >= score(p, c) * alpha`; a kept
/// closer neighbor that is also close to `c` makes `c` redundant. Alpha
/// above 1.0 admits longer edges that improve reachability. Stops once
/// `max_degree` entries are kept.
pub fn robust_prune<F>(
    candidates: &NodeArray,
    max_degree: usize,
    alpha: f32,
    mut score_between: F,
) -> NodeArray
where
    F: FnMut(u32, u32) -> f32,
{
    let mut result = NodeArray::with_capacity(max_degree.min(candidates.len()));
    for (c, c_score) in candidates.iter() {
        if result.len() >= max_degree {
            break;
        }
        let covered = result
            .iter()
            .any(|(r, _)| score_between(r, c) >= c_score * alpha);
        if !covered {
            // Candidates arrive sorted, so this append keeps the order.
            result
                .add_in_order(c, c_score)
                .expect("candidates are sorted by score descending");
        }
    }
    result
}

type NodeSlot = RwLock<Arc<Neighbors>>;

/// Growable map from ordinal to adjacency snapshot.
///
/// The outer vector grows under a write lock; each occupied slot holds its
/// own lock so edge commits on different nodes never contend.
#[derive(Debug)]
pub struct ConcurrentNeighborMap {
    slots: RwLock<Vec<Option<Arc<NodeSlot>>>>,
    max_degree: usize,
    alpha: f32,
    empty: Arc<Neighbors>,
}

impl ConcurrentNeighborMap {
    /// Creates an empty map enforcing `max_degree` and `alpha`.
    #[must_use]
    pub fn new(max_degree: usize, alpha: f32) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            max_degree,
            alpha,
            empty: Arc::new(Neighbors::empty()),
        }
    }

    /// Maximum committed degree.
    #[must_use]
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Number of slots (one past the highest ordinal ever added).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether `node` is a member of this map.
    #[must_use]
    pub fn contains(&self, node: u32) -> bool {
        self.slots
            .read()
            .get(node as usize)
            .is_some_and(Option::is_some)
    }

    /// Ordinals of all member nodes, ascending.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn members(&self) -> Vec<u32> {
        let slots = self.slots.read();
        slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i as u32))
            .collect()
    }

    fn slot(&self, node: u32) -> Option<Arc<NodeSlot>> {
        self.slots.read().get(node as usize).cloned().flatten()
    }

    fn ensure_slot(&self, node: u32) -> Arc<NodeSlot> {
        if let Some(slot) = self.slot(node) {
            return slot;
        }
        let mut slots = self.slots.write();
        let idx = node as usize;
        if idx >= slots.len() {
            slots.resize_with(idx + 1, || None);
        }
        slots[idx]
            .get_or_insert_with(|| Arc::new(RwLock::new(Arc::new(Neighbors::empty()))))
            .clone()
    }

    /// Current snapshot for `node`; empty if the node is not a member.
    #[must_use]
    pub fn get(&self, node: u32) -> Arc<Neighbors> {
        match self.slot(node) {
            Some(slot) => slot.read().clone(),
            None => self.empty.clone(),
        }
    }

    /// Adds `node` as a member with an empty adjacency if absent.
    pub fn add_node(&self, node: u32) {
        self.ensure_slot(node);
    }

    /// Replaces `node`'s adjacency with `array`.
    ///
    /// The array must already satisfy the adjacency invariants (sorted,
    /// unique, no self-loop, length at most the max degree).
    pub fn set(&self, node: u32, array: NodeArray) {
        debug_assert!(array.len() <= self.max_degree);
        debug_assert!(!array.contains(node), "self-loop in adjacency");
        let slot = self.ensure_slot(node);
        *slot.write() = Arc::new(Neighbors::from_array(array, self.alpha));
    }

    /// Commits the backlink `node -> from` with the given score.
    ///
    /// The merged list is committed as-is while it stays within
    /// `max_degree * overflow`; past that it is diversity-pruned back down
    /// to `max_degree`. Self-edges are ignored.
    pub fn insert_edge<F>(&self, node: u32, from: u32, score: f32, overflow: f32, score_between: F)
    where
        F: FnMut(u32, u32) -> f32,
    {
        if node == from {
            return;
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let cap = (self.max_degree as f32 * overflow) as usize;
        let slot = self.ensure_slot(node);
        let mut guard = slot.write();
        let mut merged = guard.array().clone();
        if !merged.insert_sorted(from, score) {
            return;
        }
        let committed = if merged.len() > cap {
            robust_prune(&merged, self.max_degree, self.alpha, score_between)
        } else {
            merged
        };
        *guard = Arc::new(Neighbors::from_array(committed, self.alpha));
    }

    /// Rewrites `node`'s adjacency through `f`, committing the result.
    ///
    /// Used by the single-threaded cleanup pass; `f` receives the current
    /// snapshot and returns the replacement array.
    pub fn update<F>(&self, node: u32, f: F)
    where
        F: FnOnce(&NodeArray) -> NodeArray,
    {
        let slot = self.ensure_slot(node);
        let mut guard = slot.write();
        let next = f(guard.array());
        debug_assert!(next.len() <= self.max_degree);
        *guard = Arc::new(Neighbors::from_array(next, self.alpha));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array_of(entries: &[(u32, f32)]) -> NodeArray {
        let mut a = NodeArray::new();
        for &(n, s) in entries {
            a.insert_sorted(n, s);
        }
        a
    }

    #[test]
    fn test_short_edges_counts_near_best() {
        let a = array_of(&[(1, 0.9), (2, 0.85), (3, 0.2)]);
        // alpha 1.1: 0.85 * 1.1 >= 0.9 but 0.2 * 1.1 < 0.9.
        let n = Neighbors::from_array(a, 1.1);
        assert_eq!(n.short_edges(), 2);
    }

    #[test]
    fn test_robust_prune_drops_covered_candidate() {
        // Candidate 2 is closer to kept candidate 1 than to p: dropped.
        let candidates = array_of(&[(1, 0.9), (2, 0.8), (3, 0.3)]);
        let pruned = robust_prune(&candidates, 4, 1.0, |r, c| match (r, c) {
            (1, 2) | (2, 1) => 0.95,
            _ => 0.1,
        });
        let nodes: Vec<u32> = pruned.iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![1, 3]);
    }

    #[test]
    fn test_robust_prune_respects_max_degree() {
        let candidates = array_of(&[(1, 0.9), (2, 0.8), (3, 0.7), (4, 0.6)]);
        let pruned = robust_prune(&candidates, 2, 1.0, |_, _| 0.0);
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned.node(0), 1);
        assert_eq!(pruned.node(1), 2);
    }

    #[test]
    fn test_insert_edge_merges_until_overflow() {
        let map = ConcurrentNeighborMap::new(2, 1.0);
        map.set(0, array_of(&[(1, 0.9), (2, 0.5)]));
        // Overflow 1.2 caps the committed size at floor(2 * 1.2) = 2,
        // so this insert forces a prune back to max_degree.
        map.insert_edge(0, 3, 0.7, 1.2, |_, _| 0.0);
        let snap = map.get(0);
        assert_eq!(snap.len(), 2);
        let nodes: Vec<u32> = snap.iter().map(|(n, _)| n).collect();
        assert_eq!(nodes, vec![1, 3]);
    }

    #[test]
    fn test_insert_edge_ignores_self_and_duplicates() {
        let map = ConcurrentNeighborMap::new(4, 1.0);
        map.set(0, array_of(&[(1, 0.9)]));
        map.insert_edge(0, 0, 1.0, 1.2, |_, _| 0.0);
        map.insert_edge(0, 1, 0.2, 1.2, |_, _| 0.0);
        let snap = map.get(0);
        assert_eq!(snap.len(), 1);
        assert!((snap.array().score(0) - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_get_missing_node_is_empty() {
        let map = ConcurrentNeighborMap::new(4, 1.0);
        assert!(map.get(42).is_empty());
        assert!(!map.contains(42));
    }

    #[test]
    fn test_concurrent_edge_inserts_keep_invariants() {
        use std::sync::Arc as StdArc;
        let map = StdArc::new(ConcurrentNeighborMap::new(8, 1.0));
        map.add_node(0);
        let threads: Vec<_> = (1..=16u32)
            .map(|i| {
                let map = StdArc::clone(&map);
                std::thread::spawn(move || {
                    #[allow(clippy::cast_precision_loss)]
                    map.insert_edge(0, i, i as f32 / 20.0, 1.25, |_, _| 0.0);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let snap = map.get(0);
        assert!(snap.len() <= 10); // floor(8 * 1.25)
        let entries: Vec<(u32, f32)> = snap.iter().collect();
        for w in entries.windows(2) {
            assert!(w[0].1 >= w[1].1, "scores must be non-increasing");
        }
        let mut nodes: Vec<u32> = entries.iter().map(|&(n, _)| n).collect();
        nodes.sort_unstable();
        nodes.dedup();
        assert_eq!(nodes.len(), entries.len(), "ordinals must be unique");
    }
}
