//! Property-based tests for the sorted node containers and packed heaps.

use bitvec::prelude::*;
use diskvec::graph::{HeapOrder, NodeArray, NodeQueue};
use proptest::prelude::*;

fn entries() -> impl Strategy<Value = Vec<(u32, f32)>> {
    prop::collection::vec((0u32..200, 0.0f32..1.0), 0..60)
}

proptest! {
    #[test]
    fn prop_insert_sorted_keeps_invariants(items in entries()) {
        let mut a = NodeArray::new();
        for (n, s) in items {
            a.insert_sorted(n, s);
        }
        let collected: Vec<(u32, f32)> = a.iter().collect();
        // Scores non-increasing.
        for w in collected.windows(2) {
            prop_assert!(w[0].1 >= w[1].1);
        }
        // Ordinals unique.
        let mut nodes: Vec<u32> = collected.iter().map(|&(n, _)| n).collect();
        nodes.sort_unstable();
        let before = nodes.len();
        nodes.dedup();
        prop_assert_eq!(before, nodes.len());
    }

    #[test]
    fn prop_merge_is_sorted_union(xs in entries(), ys in entries()) {
        let mut a = NodeArray::new();
        for (n, s) in xs {
            a.insert_sorted(n, s);
        }
        let mut b = NodeArray::new();
        for (n, s) in ys {
            b.insert_sorted(n, s);
        }
        let merged = NodeArray::merge(&a, &b);

        // Sorted.
        let collected: Vec<(u32, f32)> = merged.iter().collect();
        for w in collected.windows(2) {
            prop_assert!(w[0].1 >= w[1].1);
        }
        // Exactly the ordinal union, each once.
        let mut expected: Vec<u32> = a.iter().map(|(n, _)| n)
            .chain(b.iter().map(|(n, _)| n))
            .collect();
        expected.sort_unstable();
        expected.dedup();
        let mut got: Vec<u32> = collected.iter().map(|&(n, _)| n).collect();
        got.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_retain_keeps_set_positions(items in entries(), keep_bits in prop::collection::vec(any::<bool>(), 60)) {
        let mut a = NodeArray::new();
        for (n, s) in items {
            a.insert_sorted(n, s);
        }
        let before: Vec<(u32, f32)> = a.iter().collect();
        let mut keep = bitvec![0; keep_bits.len()];
        for (i, &b) in keep_bits.iter().enumerate() {
            keep.set(i, b);
        }
        a.retain(&keep);
        let after: Vec<(u32, f32)> = a.iter().collect();
        let expected: Vec<(u32, f32)> = before
            .iter()
            .enumerate()
            .filter(|&(i, _)| i < keep_bits.len() && keep_bits[i])
            .map(|(_, &e)| e)
            .collect();
        prop_assert_eq!(after, expected);
    }

    #[test]
    fn prop_max_queue_pops_in_score_order(items in entries()) {
        let mut q = NodeQueue::new(HeapOrder::Max);
        for &(n, s) in &items {
            q.push(n, s);
        }
        prop_assert_eq!(q.len(), items.len());
        let mut prev = f32::INFINITY;
        while let Some((_, s)) = q.pop() {
            prop_assert!(s <= prev);
            prev = s;
        }
    }

    #[test]
    fn prop_bounded_min_queue_keeps_best(items in entries(), bound in 1usize..20) {
        let mut q = NodeQueue::new(HeapOrder::Min);
        for &(n, s) in &items {
            q.push_bounded(n, s, bound);
        }
        prop_assert!(q.len() <= bound);
        // The kept scores are the top `bound` of all pushed scores.
        let mut all: Vec<f32> = items.iter().map(|&(_, s)| s).collect();
        all.sort_by(|a, b| b.total_cmp(a));
        all.truncate(bound);
        let mut kept = Vec::new();
        while let Some((_, s)) = q.pop() {
            kept.push(s);
        }
        kept.sort_by(|a, b| b.total_cmp(a));
        prop_assert_eq!(kept, all);
    }

    #[test]
    fn prop_add_in_order_only_accepts_non_increasing(scores in prop::collection::vec(0.0f32..1.0, 1..40)) {
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let mut a = NodeArray::new();
        for (i, &s) in sorted.iter().enumerate() {
            a.add_in_order(i as u32, s).unwrap();
        }
        prop_assert_eq!(a.len(), sorted.len());
        // Anything above the tail is rejected.
        let tail = a.score(a.len() - 1);
        if tail < 1.0 {
            prop_assert!(a.add_in_order(999, tail + 0.5).is_err());
        }
    }
}
