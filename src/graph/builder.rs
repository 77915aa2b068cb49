//! Concurrent graph construction.
//!
//! The builder inserts nodes by searching the graph-so-far for candidate
//! neighbors, diversity-pruning them, and committing edges through the
//! concurrent neighbor map. Insertions are safe from many threads; the
//! terminal [`cleanup`](GraphBuilder::cleanup) pass is single-threaded and
//! leaves a compact graph with no deleted nodes and dense ordinals.

use super::neighbors::{robust_prune, ConcurrentNeighborMap, Neighbors};
use super::node_array::NodeArray;
use super::queue::{HeapOrder, NodeQueue};
use super::{GraphIndex, NO_NODE};
use crate::error::{DiskVecError, Result};
use crate::metric::Similarity;
use crate::vector::{MutableVectorValues, VectorValues};
use bitvec::prelude::*;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hard cap on hierarchy depth; the geometric layer draw is also capped by
/// the current graph size, so real graphs stay far below this.
pub const MAX_LAYERS: usize = 16;

/// Construction parameters.
///
/// Typical ranges: `max_degree` 8-64, `beam_width` 60-200, `alpha`
/// 1.2-1.4, `neighbor_overflow` 1.2-1.4.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuilderParams {
    /// Target maximum degree per node (M). Larger improves recall at the
    /// cost of memory and build time.
    pub max_degree: usize,
    /// Search-list size while locating neighbors for an insertion.
    pub beam_width: usize,
    /// Diversity slack; 1.0 gives pure nearest-neighbor diversity, larger
    /// values admit longer edges that improve reachability.
    pub alpha: f32,
    /// Ratio of transient adjacency over-fill tolerated before a backlink
    /// commit re-prunes down to `max_degree`.
    pub neighbor_overflow: f32,
    /// Enables the multi-layer index.
    pub add_hierarchy: bool,
    /// Seed for the layer draw; identical seeds and inputs reproduce the
    /// same sequential build.
    pub seed: u64,
}

impl Default for BuilderParams {
    fn default() -> Self {
        Self {
            max_degree: 16,
            beam_width: 100,
            alpha: 1.2,
            neighbor_overflow: 1.2,
            add_hierarchy: false,
            seed: 42,
        }
    }
}

impl BuilderParams {
    fn validate(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(DiskVecError::Config("dimension must be positive".into()));
        }
        if self.max_degree < 2 {
            return Err(DiskVecError::Config(format!(
                "max_degree must be at least 2, got {}",
                self.max_degree
            )));
        }
        if self.beam_width == 0 {
            return Err(DiskVecError::Config("beam_width must be positive".into()));
        }
        if !self.alpha.is_finite() || self.alpha < 1.0 {
            return Err(DiskVecError::Config(format!(
                "alpha must be at least 1.0, got {}",
                self.alpha
            )));
        }
        if !self.neighbor_overflow.is_finite() || self.neighbor_overflow < 1.0 {
            return Err(DiskVecError::Config(format!(
                "neighbor_overflow must be at least 1.0, got {}",
                self.neighbor_overflow
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct EntryPoint {
    node: u32,
    level: usize,
}

/// Metrics reported by the terminal cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CleanupStats {
    /// Deleted nodes removed by compaction.
    pub removed: usize,
    /// Live nodes remaining.
    pub live: usize,
    /// Nodes whose adjacency was repaired or re-pruned.
    pub relinked: usize,
    /// Live nodes not reachable from the entry node after cleanup.
    /// Reported, not repaired.
    pub unreachable: usize,
    /// Mean fraction of short edges per live node, a graph quality signal.
    pub mean_short_edges: f32,
}

/// In-memory graph owned by a builder.
///
/// Readers may search it concurrently with insertions through the
/// [`GraphIndex`] view; each node's adjacency is an immutable snapshot
/// swapped atomically on commit.
pub struct OnHeapGraph {
    similarity: Similarity,
    dimension: usize,
    vectors: MutableVectorValues,
    layers: Vec<ConcurrentNeighborMap>,
    entry: RwLock<Option<EntryPoint>>,
    top_level: AtomicUsize,
    deleted: Mutex<BitVec>,
    deleted_count: AtomicUsize,
}

impl OnHeapGraph {
    fn new(similarity: Similarity, dimension: usize, params: &BuilderParams) -> Self {
        let layer_slots = if params.add_hierarchy { MAX_LAYERS } else { 1 };
        let layers = (0..layer_slots)
            .map(|_| ConcurrentNeighborMap::new(params.max_degree, params.alpha))
            .collect();
        Self {
            similarity,
            dimension,
            vectors: MutableVectorValues::new(dimension),
            layers,
            entry: RwLock::new(None),
            top_level: AtomicUsize::new(0),
            deleted: Mutex::new(BitVec::new()),
            deleted_count: AtomicUsize::new(0),
        }
    }

    /// Similarity function the graph was built with.
    #[must_use]
    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector source backing the graph.
    #[must_use]
    pub fn vectors(&self) -> &dyn VectorValues {
        &self.vectors
    }

    /// Number of live (non-deleted) nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.vectors
            .occupied()
            .saturating_sub(self.deleted_count.load(Ordering::Acquire))
    }

    /// Adjacency map of `layer`.
    ///
    /// # Panics
    ///
    /// Panics if `layer` is out of range.
    #[must_use]
    pub fn layer(&self, layer: usize) -> &ConcurrentNeighborMap {
        &self.layers[layer]
    }

    /// Whether a vector was ever stored at `node`.
    #[must_use]
    pub fn has_vector(&self, node: u32) -> bool {
        self.vectors.contains(node)
    }

    /// Current adjacency snapshot of `node` at `layer`.
    #[must_use]
    pub fn neighbors(&self, layer: usize, node: u32) -> Arc<Neighbors> {
        self.layers[layer].get(node)
    }

    /// Exact similarity score between two stored vectors.
    #[must_use]
    pub fn score_between(&self, a: u32, b: u32) -> f32 {
        self.similarity
            .score(&self.vectors.vector(a), &self.vectors.vector(b))
    }

    /// Exact similarity score between a query and a stored vector.
    #[must_use]
    pub fn score_to(&self, query: &[f32], node: u32) -> f32 {
        self.similarity.score(query, &self.vectors.vector(node))
    }

    fn set_deleted(&self, ordinal: u32) {
        let mut deleted = self.deleted.lock();
        let idx = ordinal as usize;
        if idx >= deleted.len() {
            deleted.resize(idx + 1, false);
        }
        if !deleted[idx] {
            deleted.set(idx, true);
            self.deleted_count.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl GraphIndex for OnHeapGraph {
    fn size(&self) -> usize {
        self.vectors.size()
    }

    fn entry_node(&self) -> Option<u32> {
        self.entry.read().map(|e| e.node)
    }

    fn max_degree(&self) -> usize {
        self.layers[0].max_degree()
    }

    fn layer_count(&self) -> usize {
        self.top_level.load(Ordering::Acquire) + 1
    }

    fn for_each_neighbor(&self, layer: usize, node: u32, visit: &mut dyn FnMut(u32)) {
        if let Some(map) = self.layers.get(layer) {
            for (n, _) in map.get(node).iter() {
                visit(n);
            }
        }
    }

    fn is_deleted(&self, node: u32) -> bool {
        let deleted = self.deleted.lock();
        deleted.get(node as usize).is_some_and(|b| *b)
    }
}

/// Concurrent proximity-graph builder.
pub struct GraphBuilder {
    graph: OnHeapGraph,
    params: BuilderParams,
}

impl GraphBuilder {
    /// Creates a builder for vectors of `dimension`.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Config`] for invalid parameters.
    pub fn new(similarity: Similarity, dimension: usize, params: BuilderParams) -> Result<Self> {
        params.validate(dimension)?;
        Ok(Self {
            graph: OnHeapGraph::new(similarity, dimension, &params),
            params,
        })
    }

    /// Inserts every vector of `vectors` in parallel, then runs cleanup.
    ///
    /// # Errors
    ///
    /// Propagates the first insertion failure.
    pub fn build(
        vectors: &dyn VectorValues,
        similarity: Similarity,
        params: BuilderParams,
    ) -> Result<(Self, CleanupStats)> {
        let mut builder = Self::new(similarity, vectors.dimension(), params)?;
        #[allow(clippy::cast_possible_truncation)]
        (0..vectors.size() as u32)
            .into_par_iter()
            .try_for_each(|i| builder.add_graph_node(i, &vectors.vector(i)))?;
        let stats = builder.cleanup();
        Ok((builder, stats))
    }

    /// Inserts every vector of `vectors` in ordinal order on the calling
    /// thread, then runs cleanup. With a fixed seed the result is
    /// reproducible byte for byte.
    ///
    /// # Errors
    ///
    /// Propagates the first insertion failure.
    pub fn build_sequentially(
        vectors: &dyn VectorValues,
        similarity: Similarity,
        params: BuilderParams,
    ) -> Result<(Self, CleanupStats)> {
        let mut builder = Self::new(similarity, vectors.dimension(), params)?;
        #[allow(clippy::cast_possible_truncation)]
        for i in 0..vectors.size() as u32 {
            builder.add_graph_node(i, &vectors.vector(i))?;
        }
        let stats = builder.cleanup();
        Ok((builder, stats))
    }

    /// The graph under construction.
    #[must_use]
    pub fn graph(&self) -> &OnHeapGraph {
        &self.graph
    }

    /// Consumes the builder, returning the graph.
    #[must_use]
    pub fn into_graph(self) -> OnHeapGraph {
        self.graph
    }

    /// Construction parameters.
    #[must_use]
    pub fn params(&self) -> &BuilderParams {
        &self.params
    }

    /// Inserts `vector` as `ordinal`.
    ///
    /// Idempotent with respect to the ordinal and safe to call from many
    /// threads. A failure after the vector was stored marks the ordinal
    /// deleted and is reported to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] for a wrong-dimension
    /// vector; the graph is unchanged.
    pub fn add_graph_node(&self, ordinal: u32, vector: &[f32]) -> Result<()> {
        if vector.len() != self.graph.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.graph.dimension,
                actual: vector.len(),
            });
        }
        if !self.graph.vectors.try_set(ordinal, vector)? {
            return Ok(());
        }
        match self.insert_stored(ordinal, vector) {
            Ok(()) => Ok(()),
            Err(e) => {
                // The vector is in; an abandoned insert must not leave a
                // half-linked live node behind.
                self.graph.set_deleted(ordinal);
                Err(e)
            }
        }
    }

    fn insert_stored(&self, ordinal: u32, vector: &[f32]) -> Result<()> {
        let level = self.draw_level(ordinal);

        // First node becomes the entry point.
        let entry = {
            let current = *self.graph.entry.read();
            match current {
                Some(e) => e,
                None => {
                    let mut guard = self.graph.entry.write();
                    if let Some(e) = *guard {
                        e
                    } else {
                        for lc in 0..=level {
                            self.graph.layers[lc].add_node(ordinal);
                        }
                        *guard = Some(EntryPoint {
                            node: ordinal,
                            level,
                        });
                        self.graph.top_level.fetch_max(level, Ordering::AcqRel);
                        return Ok(());
                    }
                }
            }
        };

        for lc in 0..=level {
            self.graph.layers[lc].add_node(ordinal);
        }

        // Greedy descent through layers above the node's level.
        let mut seed = entry.node;
        if entry.level > level {
            for lc in ((level + 1)..=entry.level).rev() {
                let best = self.beam_search_layer(vector, lc, &[seed], 1, ordinal);
                if let Some((node, _)) = best.iter().next() {
                    seed = node;
                };
            }
        }

        // Full beam search, prune, and connect on each layer the node
        // joins, from the top of its range down to the base.
        let graph = &self.graph;
        for lc in (0..=level.min(entry.level)).rev() {
            let found =
                self.beam_search_layer(vector, lc, &[seed], self.params.beam_width, ordinal);
            let chosen = robust_prune(&found, self.params.max_degree, self.params.alpha, |a, b| {
                graph.score_between(a, b)
            });
            graph.layers[lc].set(ordinal, chosen.clone());
            for (c, c_score) in chosen.iter() {
                graph.layers[lc].insert_edge(
                    c,
                    ordinal,
                    c_score,
                    self.params.neighbor_overflow,
                    |a, b| graph.score_between(a, b),
                );
            }
            if let Some((node, _)) = found.iter().next() {
                seed = node;
            };
        }

        if level > entry.level {
            let mut guard = self.graph.entry.write();
            let current = guard.expect("entry point set before any linked insert");
            if level > current.level {
                *guard = Some(EntryPoint {
                    node: ordinal,
                    level,
                });
                self.graph.top_level.fetch_max(level, Ordering::AcqRel);
            }
        }
        Ok(())
    }

    /// Marks a node deleted. Sticky: only cleanup clears it, by removing
    /// the node. Neighbor lists are unchanged until then.
    pub fn mark_node_deleted(&self, ordinal: u32) {
        self.graph.set_deleted(ordinal);
    }

    /// Serializes the graph to `path`, optionally with a PQ codec and
    /// codes for every live vector. See [`crate::disk::write_graph`].
    ///
    /// # Errors
    ///
    /// Propagates I/O and encoding failures; the target path is never left
    /// half-written.
    pub fn save(&self, path: &std::path::Path, pq: Option<&crate::pq::ProductQuantizer>) -> Result<()> {
        crate::disk::write_graph(&self.graph, pq, path)
    }

    /// Geometric layer draw with ratio `1 / max_degree`, derived from the
    /// builder seed and the ordinal so the draw is independent of thread
    /// interleaving. Capped by the current graph size.
    fn draw_level(&self, ordinal: u32) -> usize {
        if !self.params.add_hierarchy {
            return 0;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(
            self.params
                .seed
                .wrapping_add(u64::from(ordinal).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        );
        #[allow(clippy::cast_precision_loss)]
        let ratio = 1.0 / self.params.max_degree as f64;
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let size_cap = ((self.graph.size() + 1) as f64).ln()
            / (self.params.max_degree as f64).ln();
        let cap = (size_cap as usize).min(MAX_LAYERS - 1);
        let mut level = 0;
        while level < cap && rng.gen::<f64>() < ratio {
            level += 1;
        }
        level
    }

    /// Best-first search restricted to one layer, returning up to `ef`
    /// results sorted by score descending. `exclude` (the node being
    /// inserted) and deleted nodes route but are never returned.
    fn beam_search_layer(
        &self,
        query: &[f32],
        layer: usize,
        entry_points: &[u32],
        ef: usize,
        exclude: u32,
    ) -> NodeArray {
        let graph = &self.graph;
        let snapshot_size = graph.size();
        let mut visited = bitvec![0; snapshot_size];
        let mut candidates = NodeQueue::new(HeapOrder::Max);
        let mut results = NodeQueue::new(HeapOrder::Min);

        for &ep in entry_points {
            if (ep as usize) >= snapshot_size || visited[ep as usize] {
                continue;
            }
            visited.set(ep as usize, true);
            let score = graph.score_to(query, ep);
            candidates.push(ep, score);
            if ep != exclude && !graph.is_deleted(ep) {
                results.push_bounded(ep, score, ef);
            }
        }

        while let Some((node, score)) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.top_score() {
                    if score <= worst {
                        break;
                    }
                }
            }
            graph.for_each_neighbor(layer, node, &mut |n| {
                let idx = n as usize;
                // Nodes appended after the size snapshot are left to later
                // inserts.
                if idx >= snapshot_size || visited[idx] {
                    return;
                }
                visited.set(idx, true);
                let s = graph.score_to(query, n);
                candidates.push(n, s);
                if n != exclude && !graph.is_deleted(n) {
                    results.push_bounded(n, s, ef);
                }
            });
        }

        let mut drained = Vec::with_capacity(results.len());
        results.drain_into(&mut drained);
        let mut out = NodeArray::with_capacity(drained.len());
        for &(node, score) in drained.iter().rev() {
            out.add_in_order(node, score)
                .expect("heap drain yields non-increasing scores");
        }
        out
    }

    /// Terminal single-threaded pass: repairs adjacency around deleted
    /// nodes, enforces the degree bound everywhere, compacts ordinals into
    /// `[0, live_count)`, and remaps the entry node.
    ///
    /// Live nodes left unreachable from the entry are counted in the
    /// returned stats but not repaired.
    pub fn cleanup(&mut self) -> CleanupStats {
        let graph = &self.graph;
        let size = graph.size();
        let deleted = graph.deleted.lock().clone();
        let is_deleted =
            |ordinal: u32| deleted.get(ordinal as usize).is_some_and(|b| *b);
        let removed = (0..size).filter(|&i| deleted.get(i).is_some_and(|b| *b)).count();
        let live = size - removed;
        let max_degree = self.params.max_degree;
        let alpha = self.params.alpha;
        let degree_floor = max_degree / 2;

        let mut relinked = 0usize;

        // Repair pass: drop edges to deleted nodes, re-run diversity where
        // edges were dropped, refill badly thinned base-layer nodes, and
        // cap any adjacency the overflow rule left above max_degree.
        #[allow(clippy::cast_possible_truncation)]
        for node in 0..size as u32 {
            if is_deleted(node) || !graph.vectors.contains(node) {
                continue;
            }
            for layer in 0..graph.layers.len() {
                let map = &graph.layers[layer];
                if !map.contains(node) {
                    continue;
                }
                let snapshot = map.get(node);
                let had_deleted = snapshot.iter().any(|(n, _)| is_deleted(n));
                if !had_deleted && snapshot.len() <= max_degree {
                    continue;
                }
                let mut survivors = NodeArray::with_capacity(snapshot.len());
                for (n, s) in snapshot.iter() {
                    if !is_deleted(n) {
                        survivors
                            .add_in_order(n, s)
                            .expect("snapshot is sorted");
                    }
                }
                let repaired = if had_deleted && layer == 0 && survivors.len() < degree_floor {
                    // Too few edges survive; search the live graph for
                    // replacements around this node's own vector.
                    let query = graph.vectors.vector(node).into_owned();
                    let seeds: Vec<u32> = graph
                        .entry_node()
                        .into_iter()
                        .filter(|&e| !is_deleted(e))
                        .chain(survivors.iter().map(|(n, _)| n))
                        .collect();
                    let found = self.beam_search_layer(
                        &query,
                        0,
                        &seeds,
                        self.params.beam_width,
                        node,
                    );
                    let merged = NodeArray::merge(&survivors, &found);
                    robust_prune(&merged, max_degree, alpha, |a, b| graph.score_between(a, b))
                } else {
                    robust_prune(&survivors, max_degree, alpha, |a, b| {
                        graph.score_between(a, b)
                    })
                };
                map.update(node, |_| repaired);
                relinked += 1;
            }
        }

        // Entry repair: promote the highest-layer live member.
        let entry_live = matches!(graph.entry_node(), Some(e) if !is_deleted(e));
        if !entry_live {
            let mut replacement = None;
            for layer in (0..graph.layers.len()).rev() {
                if let Some(&node) = graph.layers[layer]
                    .members()
                    .iter()
                    .find(|&&n| !is_deleted(n))
                {
                    replacement = Some(EntryPoint { node, level: layer });
                    break;
                }
            }
            *graph.entry.write() = replacement;
        }

        if removed > 0 {
            self.compact(&deleted);
        }

        let stats = self.reachability_stats(removed, live, relinked);
        debug!(
            "cleanup: removed={} live={} relinked={} unreachable={}",
            stats.removed, stats.live, stats.relinked, stats.unreachable
        );
        if stats.unreachable > 0 {
            warn!(
                "cleanup left {} live nodes unreachable from the entry node",
                stats.unreachable
            );
        }
        stats
    }

    /// Renumbers live ordinals into `[0, live_count)` sequentially by old
    /// order and rebuilds vectors, layers, and the entry through the map.
    fn compact(&mut self, deleted: &BitVec) {
        let (vectors, layers, entry, top) = {
            let graph = &self.graph;
            let size = graph.size();
            let mut remap: Vec<u32> = vec![NO_NODE; size];
            let mut next = 0u32;
            #[allow(clippy::cast_possible_truncation)]
            for old in 0..size {
                let gone = deleted.get(old).is_some_and(|b| *b)
                    || !graph.vectors.contains(old as u32);
                if !gone {
                    remap[old] = next;
                    next += 1;
                }
            }

            let vectors = MutableVectorValues::new(graph.dimension);
            for (old, &new) in remap.iter().enumerate() {
                if new != NO_NODE {
                    #[allow(clippy::cast_possible_truncation)]
                    let v = graph.vectors.vector(old as u32);
                    vectors
                        .try_set(new, &v)
                        .expect("compaction preserves dimension");
                }
            }

            let mut layers = Vec::with_capacity(graph.layers.len());
            for map in &graph.layers {
                let new_map =
                    ConcurrentNeighborMap::new(self.params.max_degree, self.params.alpha);
                for old in map.members() {
                    let new = remap[old as usize];
                    if new == NO_NODE {
                        continue;
                    }
                    new_map.add_node(new);
                    let snapshot = map.get(old);
                    let mut array = NodeArray::with_capacity(snapshot.len());
                    for (n, s) in snapshot.iter() {
                        let t = remap[n as usize];
                        if t != NO_NODE {
                            array.add_in_order(t, s).expect("snapshot is sorted");
                        }
                    }
                    new_map.set(new, array);
                }
                layers.push(new_map);
            }

            let entry = graph.entry.read().map(|e| EntryPoint {
                node: remap[e.node as usize],
                level: e.level,
            });
            let top = layers
                .iter()
                .enumerate()
                .rev()
                .find(|(_, m)| !m.members().is_empty())
                .map_or(0, |(i, _)| i);
            (vectors, layers, entry, top)
        };

        self.graph.vectors = vectors;
        self.graph.layers = layers;
        *self.graph.entry.write() = entry;
        self.graph.top_level.store(top, Ordering::Release);
        *self.graph.deleted.lock() = BitVec::new();
        self.graph.deleted_count.store(0, Ordering::Release);
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn reachability_stats(&self, removed: usize, live: usize, relinked: usize) -> CleanupStats {
        let graph = &self.graph;
        let mut reached = 0usize;
        if let Some(entry) = graph.entry_node() {
            let mut seen = bitvec![0; graph.size()];
            let mut queue = VecDeque::new();
            seen.set(entry as usize, true);
            queue.push_back(entry);
            while let Some(node) = queue.pop_front() {
                let seen = &mut seen;
                let queue = &mut queue;
                graph.for_each_neighbor(0, node, &mut |n| {
                    let idx = n as usize;
                    if !seen[idx] {
                        seen.set(idx, true);
                        queue.push_back(n);
                    }
                });
            }
            reached = seen.count_ones();
        }

        let mut short_sum = 0.0f64;
        let mut short_nodes = 0usize;
        for node in 0..graph.size() as u32 {
            let snapshot = graph.layers[0].get(node);
            if !snapshot.is_empty() {
                short_sum += snapshot.short_edges() as f64 / snapshot.len() as f64;
                short_nodes += 1;
            }
        }
        CleanupStats {
            removed,
            live,
            relinked,
            unreachable: live.saturating_sub(reached),
            mean_short_edges: if short_nodes == 0 {
                0.0
            } else {
                (short_sum / short_nodes as f64) as f32
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::DenseVectorValues;

    fn unit_circle(angles: &[f32]) -> DenseVectorValues {
        let mut v = DenseVectorValues::new(2);
        for &a in angles {
            let theta = std::f32::consts::PI * a;
            v.push(&[theta.cos(), theta.sin()]).unwrap();
        }
        v
    }

    #[test]
    fn test_params_validation() {
        let bad = BuilderParams {
            max_degree: 1,
            ..BuilderParams::default()
        };
        assert!(GraphBuilder::new(Similarity::Euclidean, 4, bad).is_err());
        let bad_alpha = BuilderParams {
            alpha: 0.5,
            ..BuilderParams::default()
        };
        assert!(GraphBuilder::new(Similarity::Euclidean, 4, bad_alpha).is_err());
        assert!(GraphBuilder::new(Similarity::Euclidean, 0, BuilderParams::default()).is_err());
    }

    #[test]
    fn test_first_node_becomes_entry() {
        let builder =
            GraphBuilder::new(Similarity::Cosine, 2, BuilderParams::default()).unwrap();
        builder.add_graph_node(0, &[1.0, 0.0]).unwrap();
        assert_eq!(builder.graph().entry_node(), Some(0));
        assert_eq!(builder.graph().size(), 1);
    }

    #[test]
    fn test_add_graph_node_is_idempotent() {
        let builder =
            GraphBuilder::new(Similarity::Cosine, 2, BuilderParams::default()).unwrap();
        builder.add_graph_node(0, &[1.0, 0.0]).unwrap();
        builder.add_graph_node(1, &[0.0, 1.0]).unwrap();
        let before = builder.graph().neighbors(0, 0).array().clone();
        builder.add_graph_node(1, &[0.5, 0.5]).unwrap();
        assert_eq!(builder.graph().neighbors(0, 0).array(), &before);
        assert_eq!(&*builder.graph().vectors().vector(1), &[0.0, 1.0]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let builder =
            GraphBuilder::new(Similarity::Cosine, 2, BuilderParams::default()).unwrap();
        let err = builder.add_graph_node(0, &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, DiskVecError::DimensionMismatch { .. }));
        assert_eq!(builder.graph().size(), 0);
    }

    #[test]
    fn test_mark_deleted_is_sticky_and_counted() {
        let builder =
            GraphBuilder::new(Similarity::Cosine, 2, BuilderParams::default()).unwrap();
        builder.add_graph_node(0, &[1.0, 0.0]).unwrap();
        builder.add_graph_node(1, &[0.0, 1.0]).unwrap();
        builder.mark_node_deleted(0);
        builder.mark_node_deleted(0);
        assert!(builder.graph().is_deleted(0));
        assert_eq!(builder.graph().live_count(), 1);
    }

    #[test]
    fn test_diverse_neighbors_on_unit_circle() {
        // Six unit-circle vectors whose pairwise angles make diversity
        // pruning decisions unambiguous.
        let vectors = unit_circle(&[0.5, 0.75, 0.2, 0.9, 0.8, 0.77]);
        let params = BuilderParams {
            max_degree: 4,
            beam_width: 10,
            alpha: 1.0,
            ..BuilderParams::default()
        };
        let builder = GraphBuilder::new(Similarity::Cosine, 2, params).unwrap();
        for i in 0..vectors.size() {
            #[allow(clippy::cast_possible_truncation)]
            builder
                .add_graph_node(i as u32, vectors.get(i as u32))
                .unwrap();
        }
        let adj = |n: u32| -> Vec<u32> {
            let mut v: Vec<u32> = builder.graph().neighbors(0, n).iter().map(|(i, _)| i).collect();
            v.sort_unstable();
            v
        };
        assert_eq!(adj(0), vec![1, 2]);
        assert_eq!(adj(1), vec![0, 3, 4, 5]);
        assert_eq!(adj(2), vec![0]);
        assert_eq!(adj(3), vec![1, 4]);
        assert_eq!(adj(4), vec![1, 3, 5]);
        assert_eq!(adj(5), vec![1, 4]);
    }

    #[test]
    fn test_cleanup_empty_graph() {
        let mut builder =
            GraphBuilder::new(Similarity::Euclidean, 2, BuilderParams::default()).unwrap();
        let stats = builder.cleanup();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.removed, 0);
    }
}
