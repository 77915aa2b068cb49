//! Unified error hierarchy for DiskVec.
//!
//! A single top-level [`DiskVecError`] covers the failure modes that cross
//! module boundaries. Narrow, operation-local failures (such as an
//! out-of-order append into a sorted array) keep their own small error types
//! next to the operation that raises them.

use thiserror::Error;

/// The unified DiskVec error type.
#[derive(Debug, Error)]
pub enum DiskVecError {
    /// Invalid configuration parameter. Fatal at builder or quantizer
    /// construction; the offending value is named in the message.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A vector was inserted or queried with the wrong dimension.
    /// The index is unchanged.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was created with.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },

    /// Read, write, or map failure while persisting or loading a graph.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file being loaded is not a valid index: bad magic, unknown
    /// version, checksum mismatch, or out-of-bounds references.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// A user-supplied score provider failed. The search call is abandoned
    /// but the searcher remains usable for a fresh call.
    #[error("score function failed at node {node}: {reason}")]
    ScoreFunction {
        /// Ordinal the provider was scoring when it failed.
        node: u32,
        /// Provider-supplied description of the failure.
        reason: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DiskVecError>;
