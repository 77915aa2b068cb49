//! Best-first graph search with approximate scoring and lazy reranking.
//!
//! A [`GraphSearcher`] owns the per-call state (frontier, result set,
//! visited set, eviction log) and can be reused across calls; multiple
//! searchers may traverse the same read-only graph concurrently. Searches
//! score nodes through a [`ScoreProvider`], which is either exact, or a
//! quantized approximation with an optional exact reranker.

use super::queue::{BoundedPush, HeapOrder, NodeQueue};
use super::{Bits, GraphIndex, NodeArray};
use crate::error::{DiskVecError, Result};
use crate::metric::Similarity;
use crate::pq::PqScoreTable;
use crate::vector::VectorValues;
use bitvec::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Window of recently seen frontier scores driving the threshold-mode stop
/// rule.
const SCORE_WINDOW: usize = 128;

/// Threshold-mode search stops once the modeled probability of a future
/// score clearing the threshold drops below this.
const STOP_PROBABILITY: f64 = 0.1;

/// Graph size past which an on-disk traversal switches from a bitset to a
/// hash set for visited tracking.
const SPARSE_VISITED_MIN: usize = 1 << 20;

/// Fallible node scoring function supplied by the caller.
///
/// The error string becomes [`DiskVecError::ScoreFunction`].
pub type ScoreFn<'a> = Box<dyn Fn(u32) -> std::result::Result<f32, String> + 'a>;

/// Exact rescoring half of a quantized provider.
pub struct Reranker<'a> {
    query: Vec<f32>,
    similarity: Similarity,
    vectors: &'a dyn VectorValues,
}

/// Scoring interface handed to a search.
///
/// Two concrete shapes cover the hot paths without dynamic dispatch: an
/// exact provider (the approximate score *is* the exact score) and a
/// quantized provider (table-assembled approximation, optional exact
/// reranker). The `Custom` shape exists for callers with their own scoring
/// and for exercising provider-failure handling.
pub enum ScoreProvider<'a> {
    /// Exact similarity against a vector view.
    Exact {
        /// The query vector.
        query: Vec<f32>,
        /// Similarity function of the index.
        similarity: Similarity,
        /// Vector source scored against.
        vectors: &'a dyn VectorValues,
    },
    /// Table-assembled quantized approximation.
    Quantized {
        /// Precomputed per-subspace score table for the query.
        table: PqScoreTable<'a>,
        /// Packed code sequences, `code_len` bytes per ordinal.
        codes: &'a [u8],
        /// Bytes per ordinal in `codes`.
        code_len: usize,
        /// Exact rescoring source; `None` leaves approximate scores final.
        reranker: Option<Reranker<'a>>,
    },
    /// Caller-supplied scoring closures.
    Custom {
        /// Approximate score.
        approx: ScoreFn<'a>,
        /// Exact score; `None` leaves approximate scores final.
        rerank: Option<ScoreFn<'a>>,
    },
}

impl<'a> ScoreProvider<'a> {
    /// Exact provider scoring `query` against `vectors`.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] if the query dimension
    /// does not match the view.
    pub fn exact(
        query: &[f32],
        similarity: Similarity,
        vectors: &'a dyn VectorValues,
    ) -> Result<Self> {
        if query.len() != vectors.dimension() {
            return Err(DiskVecError::DimensionMismatch {
                expected: vectors.dimension(),
                actual: query.len(),
            });
        }
        Ok(ScoreProvider::Exact {
            query: query.to_vec(),
            similarity,
            vectors,
        })
    }

    /// Quantized provider assembling scores from `table` over `codes`,
    /// reranking against `rerank_vectors` when provided.
    pub fn quantized(
        table: PqScoreTable<'a>,
        codes: &'a [u8],
        code_len: usize,
        similarity: Similarity,
        query: &[f32],
        rerank_vectors: Option<&'a dyn VectorValues>,
    ) -> Self {
        let reranker = rerank_vectors.map(|vectors| Reranker {
            query: query.to_vec(),
            similarity,
            vectors,
        });
        ScoreProvider::Quantized {
            table,
            codes,
            code_len,
            reranker,
        }
    }

    /// Provider built from caller closures.
    #[must_use]
    pub fn custom(approx: ScoreFn<'a>, rerank: Option<ScoreFn<'a>>) -> Self {
        ScoreProvider::Custom { approx, rerank }
    }

    /// Cheap, possibly compressed score for `node`; higher is better.
    pub fn approx_score(&self, node: u32) -> Result<f32> {
        match self {
            ScoreProvider::Exact {
                query,
                similarity,
                vectors,
            } => Ok(similarity.score(query, &vectors.vector(node))),
            ScoreProvider::Quantized {
                table,
                codes,
                code_len,
                ..
            } => {
                let at = node as usize * code_len;
                Ok(table.score(&codes[at..at + code_len]))
            }
            ScoreProvider::Custom { approx, .. } => {
                approx(node).map_err(|reason| DiskVecError::ScoreFunction { node, reason })
            }
        }
    }

    /// Scores a batch of nodes into `out`, preserving order.
    ///
    /// The quantized shape walks the code region sequentially, which is the
    /// point of batching; other shapes fall back to one call per node.
    pub fn approx_score_batch(&self, nodes: &[u32], out: &mut Vec<f32>) -> Result<()> {
        out.clear();
        if let ScoreProvider::Quantized {
            table,
            codes,
            code_len,
            ..
        } = self
        {
            out.reserve(nodes.len());
            for &node in nodes {
                let at = node as usize * code_len;
                out.push(table.score(&codes[at..at + code_len]));
            }
            return Ok(());
        }
        out.reserve(nodes.len());
        for &node in nodes {
            out.push(self.approx_score(node)?);
        }
        Ok(())
    }

    /// Whether exact rescoring is available.
    #[must_use]
    pub fn has_rerank(&self) -> bool {
        match self {
            ScoreProvider::Exact { .. } => false,
            ScoreProvider::Quantized { reranker, .. } => reranker.is_some(),
            ScoreProvider::Custom { rerank, .. } => rerank.is_some(),
        }
    }

    /// Exact score for `node`; falls back to the approximate score when no
    /// reranker is configured.
    pub fn rerank_score(&self, node: u32) -> Result<f32> {
        match self {
            ScoreProvider::Quantized {
                reranker: Some(r), ..
            } => Ok(r.similarity.score(&r.query, &r.vectors.vector(node))),
            ScoreProvider::Custom {
                rerank: Some(f), ..
            } => f(node).map_err(|reason| DiskVecError::ScoreFunction { node, reason }),
            _ => self.approx_score(node),
        }
    }
}

/// Outcome of a search call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    /// `(ordinal, score)` pairs, score-descending.
    pub nodes: Vec<(u32, f32)>,
    /// Nodes marked visited during the traversal.
    pub visited_count: usize,
    /// Exact rescoring invocations performed.
    pub reranked_count: usize,
}

/// Visited-node tracking, sized to the traversal.
enum VisitedSet {
    Dense(BitVec),
    Sparse(HashSet<u32>),
}

impl VisitedSet {
    fn for_graph(graph: &dyn GraphIndex) -> Self {
        if graph.prefers_sparse_visited() && graph.size() > SPARSE_VISITED_MIN {
            VisitedSet::Sparse(HashSet::new())
        } else {
            VisitedSet::Dense(bitvec![0; graph.size()])
        }
    }

    /// Marks `node`; returns true if it was not yet visited.
    fn insert(&mut self, node: u32) -> bool {
        match self {
            VisitedSet::Dense(bits) => {
                let idx = node as usize;
                if bits[idx] {
                    false
                } else {
                    bits.set(idx, true);
                    true
                }
            }
            VisitedSet::Sparse(set) => set.insert(node),
        }
    }
}

/// Running normal model over the last [`SCORE_WINDOW`] frontier scores,
/// used to predict whether threshold-mode search should keep going.
struct ScoreTracker {
    window: Vec<f32>,
    next: usize,
    sum: f64,
    sum_sq: f64,
}

impl ScoreTracker {
    fn new() -> Self {
        Self {
            window: Vec::with_capacity(SCORE_WINDOW),
            next: 0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    fn push(&mut self, score: f32) {
        let s = f64::from(score);
        if self.window.len() < SCORE_WINDOW {
            self.window.push(score);
        } else {
            let old = f64::from(self.window[self.next]);
            self.sum -= old;
            self.sum_sq -= old * old;
            self.window[self.next] = score;
            self.next = (self.next + 1) % SCORE_WINDOW;
        }
        self.sum += s;
        self.sum_sq += s * s;
    }

    fn ready(&self) -> bool {
        self.window.len() >= SCORE_WINDOW
    }

    /// P(next score >= threshold) under a normal fit of the window.
    fn probability_above(&self, threshold: f32) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = self.window.len() as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(1e-12);
        let z = (f64::from(threshold) - mean) / var.sqrt();
        1.0 - normal_cdf(z)
    }
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation.
fn normal_cdf(z: f64) -> f64 {
    let x = z / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * x.abs());
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-x * x).exp();
    let signed = if x < 0.0 { -erf } else { erf };
    0.5 * (1.0 + signed)
}

#[derive(Clone, Copy, Debug)]
enum SearchKind {
    TopK { top_k: usize, rerank_k: usize },
    Threshold(f32),
}

/// Reusable best-first searcher.
///
/// State is thread-local to one search call; create one searcher per
/// thread. After a completed [`search`](Self::search), a
/// [`resume`](Self::resume) continues from the retained frontier and
/// returns only nodes not already returned.
pub struct GraphSearcher {
    candidates: NodeQueue,
    results: NodeQueue,
    threshold_hits: NodeArray,
    evicted: Vec<(u32, f32)>,
    visited: Option<VisitedSet>,
    returned: HashSet<u32>,
    rerank_cache: HashMap<u32, f32>,
    scratch: Vec<u32>,
    score_scratch: Vec<f32>,
    visited_count: usize,
    reranked_count: usize,
    resumable: bool,
}

impl Default for GraphSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphSearcher {
    /// Creates a searcher with empty, reusable state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            candidates: NodeQueue::new(HeapOrder::Max),
            results: NodeQueue::new(HeapOrder::Min),
            threshold_hits: NodeArray::new(),
            evicted: Vec::new(),
            visited: None,
            returned: HashSet::new(),
            rerank_cache: HashMap::new(),
            scratch: Vec::new(),
            score_scratch: Vec::new(),
            visited_count: 0,
            reranked_count: 0,
            resumable: false,
        }
    }

    /// Top-K search.
    ///
    /// Returns the best `top_k` accepted nodes, exploring with a result
    /// set of `rerank_k >= top_k` to protect recall under approximate
    /// scoring.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Config`] if `rerank_k < top_k`, or
    /// [`DiskVecError::ScoreFunction`] if the provider fails (the searcher
    /// stays usable for a fresh call).
    pub fn search(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        top_k: usize,
        rerank_k: usize,
        bits: Bits<'_>,
    ) -> Result<SearchResult> {
        self.search_internal(
            graph,
            provider,
            SearchKind::TopK { top_k, rerank_k },
            bits,
            None,
        )
    }

    /// Top-K search with a cooperative cancellation token.
    ///
    /// The token is checked between expansions; once it fires the call
    /// returns a well-formed top-K of everything seen so far.
    ///
    /// # Errors
    ///
    /// Same conditions as [`search`](Self::search).
    pub fn search_cancellable(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        top_k: usize,
        rerank_k: usize,
        bits: Bits<'_>,
        cancel: &AtomicBool,
    ) -> Result<SearchResult> {
        self.search_internal(
            graph,
            provider,
            SearchKind::TopK { top_k, rerank_k },
            bits,
            Some(cancel),
        )
    }

    /// Threshold search: returns every accepted node whose final score is
    /// at least `threshold`.
    ///
    /// Termination is driven by a running normal model of recently seen
    /// frontier scores, so restrictive thresholds visit far fewer than N
    /// nodes.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::ScoreFunction`] if the provider fails.
    pub fn search_threshold(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        threshold: f32,
        bits: Bits<'_>,
    ) -> Result<SearchResult> {
        self.search_internal(graph, provider, SearchKind::Threshold(threshold), bits, None)
    }

    /// Continues a prior [`search`](Self::search) without restarting.
    ///
    /// Returns the next `extra_top_k` best nodes that were not previously
    /// returned, exploring with a fresh result bound of `extra_rerank_k`.
    /// The same graph, provider, and bits must be supplied. Sorting the
    /// concatenation of `search(k)` and `resume(k')` by score equals the
    /// first `k + k'` results of `search(k + k')`, up to score ties.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::ScoreFunction`] if the provider fails.
    pub fn resume(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        extra_top_k: usize,
        extra_rerank_k: usize,
        bits: Bits<'_>,
    ) -> Result<SearchResult> {
        if !self.resumable {
            return Ok(SearchResult::default());
        }
        let kind = SearchKind::TopK {
            top_k: extra_top_k,
            rerank_k: extra_rerank_k,
        };
        self.visited_count = 0;
        self.reranked_count = 0;
        // Re-offer everything that was seen but not returned; nodes that
        // were already expanded will expand into an all-visited frontier,
        // which is a no-op.
        let held = std::mem::take(&mut self.evicted);
        for (node, score) in held {
            self.consider(graph, node, score, kind, bits);
        }
        let run = self
            .main_loop(graph, provider, kind, bits, None)
            .and_then(|()| self.finish(provider, kind));
        if run.is_err() {
            self.resumable = false;
        }
        run
    }

    fn search_internal(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        kind: SearchKind,
        bits: Bits<'_>,
        cancel: Option<&AtomicBool>,
    ) -> Result<SearchResult> {
        if let SearchKind::TopK { top_k, rerank_k } = kind {
            if rerank_k < top_k {
                return Err(DiskVecError::Config(format!(
                    "rerank_k ({rerank_k}) must be at least top_k ({top_k})"
                )));
            }
        }
        self.reset(graph);
        let Some(entry) = graph.entry_node() else {
            return Ok(SearchResult::default());
        };

        let run = self
            .seed_and_run(graph, provider, entry, kind, bits, cancel)
            .and_then(|()| self.finish(provider, kind));
        if run.is_err() {
            self.resumable = false;
        }
        run
    }

    fn seed_and_run(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        entry: u32,
        kind: SearchKind,
        bits: Bits<'_>,
        cancel: Option<&AtomicBool>,
    ) -> Result<()> {
        // Greedy single-step descent through the upper layers; the best
        // node of each layer seeds the layer below.
        let mut seed = entry;
        for layer in (1..graph.layer_count()).rev() {
            seed = self.greedy_descend(graph, provider, layer, seed)?;
        }

        let score = provider.approx_score(seed)?;
        if self
            .visited
            .as_mut()
            .expect("visited set initialized by reset")
            .insert(seed)
        {
            self.visited_count += 1;
        }
        self.consider(graph, seed, score, kind, bits);
        self.main_loop(graph, provider, kind, bits, cancel)
    }

    fn reset(&mut self, graph: &dyn GraphIndex) {
        self.candidates.clear();
        self.results.clear();
        self.threshold_hits.clear();
        self.evicted.clear();
        self.visited = Some(VisitedSet::for_graph(graph));
        self.returned.clear();
        self.rerank_cache.clear();
        self.visited_count = 0;
        self.reranked_count = 0;
        self.resumable = false;
    }

    /// Moves to the best-scoring node reachable by repeated single steps at
    /// `layer`.
    fn greedy_descend(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        layer: usize,
        start: u32,
    ) -> Result<u32> {
        let mut cur = start;
        let mut cur_score = provider.approx_score(cur)?;
        loop {
            self.scratch.clear();
            {
                let scratch = &mut self.scratch;
                graph.for_each_neighbor(layer, cur, &mut |n| scratch.push(n));
            }
            let mut best = cur;
            let mut best_score = cur_score;
            let examined = self.scratch.len();
            for &n in &self.scratch {
                let s = provider.approx_score(n)?;
                if s > best_score {
                    best = n;
                    best_score = s;
                }
            }
            self.visited_count += examined;
            if best == cur {
                return Ok(cur);
            }
            cur = best;
            cur_score = best_score;
        }
    }

    /// Offers a node to the frontier and, when acceptable, to the result
    /// set; displaced entries land in the eviction log for resume.
    fn consider(
        &mut self,
        graph: &dyn GraphIndex,
        node: u32,
        score: f32,
        kind: SearchKind,
        bits: Bits<'_>,
    ) {
        self.candidates.push(node, score);
        if !bits.accepts(node) || graph.is_deleted(node) || self.returned.contains(&node) {
            return;
        }
        match kind {
            SearchKind::TopK { rerank_k, .. } => {
                match self.results.push_bounded(node, score, rerank_k) {
                    BoundedPush::Added { evicted: Some(e) } => self.evicted.push(e),
                    BoundedPush::Rejected => self.evicted.push((node, score)),
                    BoundedPush::Added { evicted: None } => {}
                }
            }
            SearchKind::Threshold(t) => {
                if score >= t {
                    self.threshold_hits.insert_sorted(node, score);
                }
            }
        }
    }

    fn main_loop(
        &mut self,
        graph: &dyn GraphIndex,
        provider: &ScoreProvider<'_>,
        kind: SearchKind,
        bits: Bits<'_>,
        cancel: Option<&AtomicBool>,
    ) -> Result<()> {
        let mut tracker = ScoreTracker::new();
        while let Some((node, score)) = self.candidates.pop() {
            if let Some(token) = cancel {
                if token.load(Ordering::Relaxed) {
                    break;
                }
            }
            match kind {
                SearchKind::TopK { rerank_k, .. } => {
                    if self.results.len() >= rerank_k {
                        if let Some(worst) = self.results.top_score() {
                            if score <= worst {
                                break;
                            }
                        }
                    }
                }
                SearchKind::Threshold(threshold) => {
                    tracker.push(score);
                    if tracker.ready() && tracker.probability_above(threshold) < STOP_PROBABILITY {
                        break;
                    }
                }
            }

            // Collect unvisited neighbors, then batch-score them.
            let mut scratch = std::mem::take(&mut self.scratch);
            scratch.clear();
            {
                let visited = self
                    .visited
                    .as_mut()
                    .expect("visited set initialized by reset");
                graph.for_each_neighbor(0, node, &mut |n| {
                    if visited.insert(n) {
                        scratch.push(n);
                    }
                });
            }
            self.visited_count += scratch.len();

            let mut scores = std::mem::take(&mut self.score_scratch);
            let scored = provider.approx_score_batch(&scratch, &mut scores);
            if let Err(e) = scored {
                self.scratch = scratch;
                self.score_scratch = scores;
                return Err(e);
            }
            for (&n, &s) in scratch.iter().zip(scores.iter()) {
                self.consider(graph, n, s, kind, bits);
            }
            self.scratch = scratch;
            self.score_scratch = scores;
        }
        Ok(())
    }

    /// Final score for `node`: exact when a reranker exists (cached so a
    /// node is never reranked twice), approximate otherwise.
    fn final_score(&mut self, provider: &ScoreProvider<'_>, node: u32, approx: f32) -> Result<f32> {
        if !provider.has_rerank() {
            return Ok(approx);
        }
        if let Some(&cached) = self.rerank_cache.get(&node) {
            return Ok(cached);
        }
        let exact = provider.rerank_score(node)?;
        self.rerank_cache.insert(node, exact);
        self.reranked_count += 1;
        Ok(exact)
    }

    fn finish(&mut self, provider: &ScoreProvider<'_>, kind: SearchKind) -> Result<SearchResult> {
        match kind {
            SearchKind::TopK { top_k, .. } => {
                // Drain worst-first, then walk best-first, dropping the
                // duplicates a resume re-offer can introduce.
                let mut drained = Vec::with_capacity(self.results.len());
                self.results.drain_into(&mut drained);
                let mut pool: Vec<(u32, f32)> = Vec::with_capacity(drained.len());
                let mut seen = HashSet::with_capacity(drained.len());
                for &(node, approx) in drained.iter().rev() {
                    if seen.insert(node) {
                        pool.push((node, approx));
                    }
                }

                let mut scored = Vec::with_capacity(pool.len());
                for &(node, approx) in &pool {
                    let exact = self.final_score(provider, node, approx)?;
                    scored.push((node, exact, approx));
                }
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));

                let mut nodes = Vec::with_capacity(top_k.min(scored.len()));
                for &(node, exact, approx) in &scored {
                    if nodes.len() < top_k {
                        nodes.push((node, exact));
                        self.returned.insert(node);
                    } else {
                        // Runners-up stay reachable for resume.
                        self.evicted.push((node, approx));
                    }
                }
                self.resumable = true;
                Ok(SearchResult {
                    nodes,
                    visited_count: self.visited_count,
                    reranked_count: self.reranked_count,
                })
            }
            SearchKind::Threshold(threshold) => {
                let hits = std::mem::take(&mut self.threshold_hits);
                let mut nodes = Vec::with_capacity(hits.len());
                for (node, approx) in hits.iter() {
                    let exact = self.final_score(provider, node, approx)?;
                    if exact >= threshold {
                        nodes.push((node, exact));
                        self.returned.insert(node);
                    }
                }
                nodes.sort_by(|a, b| b.1.total_cmp(&a.1));
                self.resumable = false;
                Ok(SearchResult {
                    nodes,
                    visited_count: self.visited_count,
                    reranked_count: self.reranked_count,
                })
            }
        }
    }
}
