//! # DiskVec
//!
//! Disk-capable approximate-nearest-neighbor search: a navigable
//! proximity-graph index with optional product-quantization compression.
//!
//! A [`GraphBuilder`] incrementally inserts fixed-dimension float vectors
//! into a small-world-style graph, pruning each node's neighbors for
//! diversity. A [`GraphSearcher`] answers top-K (or score-threshold)
//! queries over any [`GraphIndex`] view: the in-memory graph under
//! construction, a memory-mapped [`OnDiskGraph`], or a [`CachedGraph`]
//! that keeps the entry neighborhood in RAM. Queries score either exactly
//! or through a [`ProductQuantizer`] approximation with exact reranking.
//!
//! ## Example
//!
//! ```rust
//! use diskvec::{
//!     Bits, BuilderParams, DenseVectorValues, GraphBuilder, GraphSearcher, ScoreProvider,
//!     Similarity,
//! };
//!
//! // 1. Collect vectors.
//! let mut vectors = DenseVectorValues::new(2);
//! for v in [[0.0, 1.0], [1.0, 0.0], [0.7, 0.7]] {
//!     vectors.push(&v).expect("dimension matches");
//! }
//!
//! // 2. Build the graph.
//! let (builder, _stats) =
//!     GraphBuilder::build_sequentially(&vectors, Similarity::Cosine, BuilderParams::default())
//!         .expect("build succeeds");
//! let graph = builder.graph();
//!
//! // 3. Search.
//! let provider = ScoreProvider::exact(&[0.8, 0.6], Similarity::Cosine, graph.vectors())
//!     .expect("query dimension matches");
//! let mut searcher = GraphSearcher::new();
//! let result = searcher
//!     .search(graph, &provider, 2, 2, Bits::All)
//!     .expect("search succeeds");
//! assert_eq!(result.nodes.len(), 2);
//! ```
//!
//! ## Persistence
//!
//! [`write_graph`] renumbers live nodes, streams the graph (and optional
//! PQ codes) to a temporary file, and renames it into place;
//! [`OnDiskGraph::open`] memory-maps and validates the result for
//! zero-copy searching.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

/// On-disk format and memory-mapped access.
pub mod disk;

/// Unified error handling.
pub mod error;

/// Graph containers, construction, and search.
pub mod graph;

/// Similarity functions and scalar kernels.
pub mod metric;

/// Product quantization.
pub mod pq;

/// Vector value backends.
pub mod vector;

pub use disk::{write_graph, CachedGraph, OnDiskGraph};
pub use error::{DiskVecError, Result};
pub use graph::{
    Bits, BuilderParams, CleanupStats, GraphBuilder, GraphIndex, GraphSearcher, NodeArray,
    NodeQueue, OnHeapGraph, ScoreProvider, SearchResult,
};
pub use metric::Similarity;
pub use pq::{PqScoreTable, ProductQuantizer};
pub use vector::{DenseVectorValues, MutableVectorValues, VectorValues};

/// The crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_not_empty() {
        assert!(!super::VERSION.is_empty());
    }
}
