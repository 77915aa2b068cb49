//! Entry-path caching for on-disk graphs.
//!
//! Every search starts at the entry node, so the first few hops of the
//! traversal hit the same records over and over. [`CachedGraph`] preloads
//! every node within a configured hop distance of the entry into memory
//! and serves those from the heap, falling through to the map for the
//! rest. RAM cost grows roughly as `max_degree ^ depth`.

use super::reader::OnDiskGraph;
use crate::graph::GraphIndex;
use crate::vector::VectorValues;
use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};

struct CachedNode {
    vector: Vec<f32>,
    neighbors: Vec<u32>,
}

/// An [`OnDiskGraph`] with the neighborhood of the entry node held in
/// memory.
pub struct CachedGraph<'a> {
    inner: &'a OnDiskGraph,
    cached: HashMap<u32, CachedNode>,
}

impl<'a> CachedGraph<'a> {
    /// Wraps `inner`, preloading every node reachable from the entry node
    /// within `depth` hops on the base layer. Depth 0 caches the entry
    /// node alone.
    #[must_use]
    pub fn new(inner: &'a OnDiskGraph, depth: usize) -> Self {
        let mut cached = HashMap::new();
        if let Some(entry) = inner.entry_node() {
            let mut frontier = VecDeque::new();
            frontier.push_back((entry, 0usize));
            while let Some((node, hops)) = frontier.pop_front() {
                if cached.contains_key(&node) {
                    continue;
                }
                let mut neighbors = Vec::with_capacity(inner.max_degree());
                inner.for_each_neighbor(0, node, &mut |n| neighbors.push(n));
                if hops < depth {
                    for &n in &neighbors {
                        frontier.push_back((n, hops + 1));
                    }
                }
                cached.insert(
                    node,
                    CachedNode {
                        vector: VectorValues::vector(inner, node).into_owned(),
                        neighbors,
                    },
                );
            }
        }
        Self { inner, cached }
    }

    /// Number of preloaded nodes.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }
}

impl GraphIndex for CachedGraph<'_> {
    fn size(&self) -> usize {
        GraphIndex::size(self.inner)
    }

    fn entry_node(&self) -> Option<u32> {
        self.inner.entry_node()
    }

    fn max_degree(&self) -> usize {
        self.inner.max_degree()
    }

    fn layer_count(&self) -> usize {
        self.inner.layer_count()
    }

    fn for_each_neighbor(&self, layer: usize, node: u32, visit: &mut dyn FnMut(u32)) {
        if layer == 0 {
            if let Some(c) = self.cached.get(&node) {
                for &n in &c.neighbors {
                    visit(n);
                }
                return;
            }
        }
        self.inner.for_each_neighbor(layer, node, visit);
    }

    fn prefers_sparse_visited(&self) -> bool {
        self.inner.prefers_sparse_visited()
    }
}

impl VectorValues for CachedGraph<'_> {
    fn size(&self) -> usize {
        VectorValues::size(self.inner)
    }

    fn dimension(&self) -> usize {
        VectorValues::dimension(self.inner)
    }

    fn vector(&self, ordinal: u32) -> Cow<'_, [f32]> {
        match self.cached.get(&ordinal) {
            Some(c) => Cow::Borrowed(&c.vector),
            None => VectorValues::vector(self.inner, ordinal),
        }
    }
}
