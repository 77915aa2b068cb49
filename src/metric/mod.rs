//! Similarity functions and their scalar kernels.
//!
//! Every score that crosses a module boundary is a *similarity score*:
//! a float in `[0, 1]` where higher means closer. [`Similarity`] owns the
//! mapping from raw kernel outputs to scores; the search and pruning
//! invariants depend only on this monotone convention.

pub mod scalar;

/// Similarity function of an index.
///
/// The variants map raw kernel values into `[0, 1]` as:
///
/// - `DotProduct`: `(1 + dot) / 2`, inputs assumed normalized to `[-1, 1]`
/// - `Euclidean`: `1 / (1 + squared_distance)`
/// - `Cosine`: `(1 + cos) / 2`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Similarity {
    /// Dot product over normalized vectors.
    DotProduct,
    /// Squared Euclidean distance.
    Euclidean,
    /// Cosine of the angle.
    Cosine,
}

impl Similarity {
    /// Wire code used in the on-disk header.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Similarity::DotProduct => 0,
            Similarity::Euclidean => 1,
            Similarity::Cosine => 2,
        }
    }

    /// Inverse of [`code`](Self::code); `None` for unknown codes.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Similarity::DotProduct),
            1 => Some(Similarity::Euclidean),
            2 => Some(Similarity::Cosine),
            _ => None,
        }
    }

    /// Similarity score of two vectors, in `[0, 1]`, higher is closer.
    ///
    /// # Panics
    ///
    /// Panics if `a` and `b` have different lengths.
    #[inline]
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Similarity::DotProduct => (1.0 + scalar::dot(a, b)) / 2.0,
            Similarity::Euclidean => 1.0 / (1.0 + scalar::square_distance(a, b)),
            Similarity::Cosine => (1.0 + scalar::cosine(a, b)) / 2.0,
        }
    }

    /// Maps a raw kernel value (a dot product, a squared distance, or a
    /// cosine) to the score this similarity reports.
    ///
    /// Used by the quantized path, where the raw value is assembled from a
    /// precomputed table rather than computed by [`score`](Self::score).
    #[inline]
    #[must_use]
    pub fn score_from_raw(self, raw: f32) -> f32 {
        match self {
            Similarity::DotProduct | Similarity::Cosine => (1.0 + raw) / 2.0,
            Similarity::Euclidean => 1.0 / (1.0 + raw),
        }
    }
}
