//! Product quantization.
//!
//! A [`ProductQuantizer`] splits the vector space into contiguous
//! subspaces and trains an independent byte codebook per subspace. A
//! vector encodes to one centroid index per subspace; queries precompute a
//! per-subspace score table so a compressed vector scores with one table
//! gather per subspace.

mod kmeans;

use crate::error::{DiskVecError, Result};
use crate::metric::{scalar, Similarity};
use crate::vector::VectorValues;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Upper bound on clusters per subspace: codes are single bytes.
pub const MAX_CLUSTERS: usize = 256;

/// Trained product quantization codec.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantizer {
    dimension: usize,
    cluster_count: usize,
    sizes: Vec<usize>,
    offsets: Vec<usize>,
    /// Per subspace: `cluster_count * sizes[s]` floats, centroid-major.
    codebooks: Vec<Vec<f32>>,
    global_mean: Option<Vec<f32>>,
}

impl ProductQuantizer {
    /// Splits `dimension` into `count` contiguous subspaces, as even as
    /// possible; the last subspace absorbs the remainder. Returns
    /// `(sizes, offsets)`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or exceeds `dimension`.
    #[must_use]
    pub fn subvector_sizes_and_offsets(dimension: usize, count: usize) -> (Vec<usize>, Vec<usize>) {
        assert!(count > 0 && count <= dimension, "invalid subspace count");
        let base = dimension / count;
        let mut sizes = vec![base; count];
        sizes[count - 1] += dimension % count;
        let mut offsets = Vec::with_capacity(count);
        let mut at = 0;
        for &s in &sizes {
            offsets.push(at);
            at += s;
        }
        (sizes, offsets)
    }

    /// Trains a codec on every vector of `vectors`.
    ///
    /// `subtract_mean` stores the training-set mean and removes it before
    /// the subspace split, which improves dot-product reconstruction; the
    /// flag is persisted with the codec.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Config`] for an empty training set, a
    /// subspace count outside `[1, dimension]`, or a cluster count outside
    /// `[1, 256]`.
    pub fn train(
        vectors: &dyn VectorValues,
        subspace_count: usize,
        cluster_count: usize,
        subtract_mean: bool,
        seed: u64,
    ) -> Result<Self> {
        let dimension = vectors.dimension();
        let n = vectors.size();
        if n == 0 {
            return Err(DiskVecError::Config("training set must not be empty".into()));
        }
        if subspace_count == 0 || subspace_count > dimension {
            return Err(DiskVecError::Config(format!(
                "subspace count must be in [1, {dimension}], got {subspace_count}"
            )));
        }
        if cluster_count == 0 || cluster_count > MAX_CLUSTERS {
            return Err(DiskVecError::Config(format!(
                "cluster count must be in [1, {MAX_CLUSTERS}], got {cluster_count}"
            )));
        }

        let global_mean = if subtract_mean {
            let mut mean = vec![0.0f32; dimension];
            for i in 0..n {
                scalar::add_in_place(&mut mean, &vectors.vector(i as u32));
            }
            #[allow(clippy::cast_precision_loss)]
            scalar::scale(&mut mean, 1.0 / n as f32);
            Some(mean)
        } else {
            None
        };

        let (sizes, offsets) = Self::subvector_sizes_and_offsets(dimension, subspace_count);
        let projections = Self::project(vectors, &sizes, &offsets, global_mean.as_deref());

        let codebooks: Vec<Vec<f32>> = projections
            .into_par_iter()
            .enumerate()
            .map(|(s, points)| {
                let mut rng = ChaCha8Rng::seed_from_u64(
                    seed.wrapping_add((s as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                );
                kmeans::cluster(&points, sizes[s], cluster_count, &mut rng).centroids
            })
            .collect();

        Ok(Self {
            dimension,
            cluster_count,
            sizes,
            offsets,
            codebooks,
            global_mean,
        })
    }

    /// Trains a codec tuned for dot-product search.
    ///
    /// Anisotropic training weights the component of the quantization
    /// residual parallel to each data vector, since that component is what
    /// distorts dot products against aligned queries. `threshold` in
    /// `(0, 1)` controls how aggressively: the parallel weight is
    /// `eta = (dimension - 1) * t^2 / (1 - t^2)`, so
    /// `threshold = 1 / sqrt(dimension)` gives `eta = 1` and reduces to
    /// plain training. No global mean is stored on this path.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Config`] under the same conditions as
    /// [`train`](Self::train), or when `threshold` is outside `(0, 1)`.
    pub fn train_anisotropic(
        vectors: &dyn VectorValues,
        subspace_count: usize,
        cluster_count: usize,
        threshold: f32,
        seed: u64,
    ) -> Result<Self> {
        let dimension = vectors.dimension();
        let n = vectors.size();
        if n == 0 {
            return Err(DiskVecError::Config("training set must not be empty".into()));
        }
        if subspace_count == 0 || subspace_count > dimension {
            return Err(DiskVecError::Config(format!(
                "subspace count must be in [1, {dimension}], got {subspace_count}"
            )));
        }
        if cluster_count == 0 || cluster_count > MAX_CLUSTERS {
            return Err(DiskVecError::Config(format!(
                "cluster count must be in [1, {MAX_CLUSTERS}], got {cluster_count}"
            )));
        }
        if !threshold.is_finite() || threshold <= 0.0 || threshold >= 1.0 {
            return Err(DiskVecError::Config(format!(
                "anisotropic threshold must be in (0, 1), got {threshold}"
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let eta = (dimension as f32 - 1.0) * threshold * threshold
            / (1.0 - threshold * threshold);

        let (sizes, offsets) = Self::subvector_sizes_and_offsets(dimension, subspace_count);
        let projections = Self::project(vectors, &sizes, &offsets, None);
        let codebooks: Vec<Vec<f32>> = projections
            .into_par_iter()
            .enumerate()
            .map(|(s, points)| {
                let mut rng = ChaCha8Rng::seed_from_u64(
                    seed.wrapping_add((s as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                );
                kmeans::cluster_anisotropic(&points, sizes[s], cluster_count, eta, &mut rng)
                    .centroids
            })
            .collect();

        Ok(Self {
            dimension,
            cluster_count,
            sizes,
            offsets,
            codebooks,
            global_mean: None,
        })
    }

    /// Per-subspace training arrays, mean removed when present.
    fn project(
        vectors: &dyn VectorValues,
        sizes: &[usize],
        offsets: &[usize],
        mean: Option<&[f32]>,
    ) -> Vec<Vec<f32>> {
        let n = vectors.size();
        let mut out: Vec<Vec<f32>> = sizes.iter().map(|s| Vec::with_capacity(s * n)).collect();
        for i in 0..n {
            let v = vectors.vector(i as u32);
            for (s, (&size, &off)) in sizes.iter().zip(offsets.iter()).enumerate() {
                match mean {
                    Some(m) => {
                        for d in 0..size {
                            out[s].push(v[off + d] - m[off + d]);
                        }
                    }
                    None => out[s].extend_from_slice(&v[off..off + size]),
                }
            }
        }
        out
    }

    /// Rebuilds a codec from persisted parts.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::Corrupt`] if the parts are inconsistent.
    pub fn from_parts(
        sizes: Vec<usize>,
        cluster_count: usize,
        codebooks: Vec<Vec<f32>>,
        global_mean: Option<Vec<f32>>,
    ) -> Result<Self> {
        if sizes.is_empty() || cluster_count == 0 || cluster_count > MAX_CLUSTERS {
            return Err(DiskVecError::Corrupt(
                "quantizer section has no subspaces or a bad cluster count".into(),
            ));
        }
        if codebooks.len() != sizes.len() {
            return Err(DiskVecError::Corrupt(
                "quantizer codebook count does not match subspace count".into(),
            ));
        }
        for (s, cb) in codebooks.iter().enumerate() {
            if cb.len() != sizes[s] * cluster_count {
                return Err(DiskVecError::Corrupt(format!(
                    "codebook {s} has {} floats, expected {}",
                    cb.len(),
                    sizes[s] * cluster_count
                )));
            }
        }
        let dimension: usize = sizes.iter().sum();
        if let Some(m) = &global_mean {
            if m.len() != dimension {
                return Err(DiskVecError::Corrupt(
                    "global mean length does not match dimension".into(),
                ));
            }
        }
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut at = 0;
        for &s in &sizes {
            offsets.push(at);
            at += s;
        }
        Ok(Self {
            dimension,
            cluster_count,
            sizes,
            offsets,
            codebooks,
            global_mean,
        })
    }

    /// Vector dimension the codec was trained for.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of subspaces (bytes per encoded vector).
    #[must_use]
    pub fn subspace_count(&self) -> usize {
        self.sizes.len()
    }

    /// Clusters per subspace.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Subspace sizes, in order.
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Centroids of subspace `s`, centroid-major.
    #[must_use]
    pub fn codebook(&self, s: usize) -> &[f32] {
        &self.codebooks[s]
    }

    /// Stored training mean, if the codec was trained with one.
    #[must_use]
    pub fn global_mean(&self) -> Option<&[f32]> {
        self.global_mean.as_deref()
    }

    /// Encodes `vector` into `out` (one byte per subspace).
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] for a wrong-dimension
    /// vector.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_into(&self, vector: &[f32], out: &mut [u8]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        debug_assert_eq!(out.len(), self.subspace_count());
        let mut scratch: Vec<f32> = Vec::new();
        let v: &[f32] = match &self.global_mean {
            Some(m) => {
                scratch.extend_from_slice(vector);
                scalar::sub_in_place(&mut scratch, m);
                &scratch
            }
            None => vector,
        };
        for (s, (&size, &off)) in self.sizes.iter().zip(self.offsets.iter()).enumerate() {
            let (c, _) = kmeans::nearest(&v[off..off + size], &self.codebooks[s], size);
            out[s] = c as u8;
        }
        Ok(())
    }

    /// Encodes `vector`, returning the code sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] for a wrong-dimension
    /// vector.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.subspace_count()];
        self.encode_into(vector, &mut out)?;
        Ok(out)
    }

    /// Encodes every vector of `vectors` into one packed buffer,
    /// `subspace_count` bytes per ordinal.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] if the view dimension
    /// differs from the codec dimension.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_all(&self, vectors: &dyn VectorValues) -> Result<Vec<u8>> {
        if vectors.dimension() != self.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.dimension,
                actual: vectors.dimension(),
            });
        }
        let k = self.subspace_count();
        let n = vectors.size();
        let mut out = vec![0u8; n * k];
        out.par_chunks_mut(k)
            .enumerate()
            .try_for_each(|(i, chunk)| self.encode_into(&vectors.vector(i as u32), chunk))?;
        Ok(out)
    }

    /// Decodes a code sequence back into a vector.
    ///
    /// # Panics
    ///
    /// Panics if `codes` has the wrong length.
    #[must_use]
    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dimension];
        self.decode_into(codes, &mut out);
        out
    }

    /// Decodes a code sequence into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `codes` or `out` has the wrong length.
    pub fn decode_into(&self, codes: &[u8], out: &mut [f32]) {
        assert_eq!(codes.len(), self.subspace_count(), "code length mismatch");
        assert_eq!(out.len(), self.dimension, "output length mismatch");
        for (s, (&size, &off)) in self.sizes.iter().zip(self.offsets.iter()).enumerate() {
            let c = codes[s] as usize;
            let centroid = &self.codebooks[s][c * size..(c + 1) * size];
            out[off..off + size].copy_from_slice(centroid);
        }
        if let Some(m) = &self.global_mean {
            scalar::add_in_place(out, m);
        }
    }

    /// Precomputes the query-side score table for `similarity`.
    ///
    /// Dot product and Euclidean assemble raw values from a `[K][C]`
    /// table; cosine falls back to full decode per scored vector, which is
    /// acceptable because cosine is rare on the quantized path.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] for a wrong-dimension
    /// query.
    pub fn score_table(&self, query: &[f32], similarity: Similarity) -> Result<PqScoreTable<'_>> {
        if query.len() != self.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let inner = match similarity {
            Similarity::Cosine => TableInner::Decoded {
                query: query.to_vec(),
                similarity,
                pq: self,
            },
            Similarity::DotProduct => {
                // decoded vector = mean + centroid, so the mean contributes
                // a constant dot(query, mean) added once per score.
                let bias = self
                    .global_mean
                    .as_ref()
                    .map_or(0.0, |m| scalar::dot(query, m));
                TableInner::Assembled {
                    table: self.fill_table(query, |q_sub, centroid| scalar::dot(q_sub, centroid)),
                    cluster_count: self.cluster_count,
                    bias,
                    similarity,
                }
            }
            Similarity::Euclidean => {
                // Shift the query by the mean instead: |q - (mean + c)|^2
                // equals |(q - mean) - c|^2.
                let mut shifted;
                let q: &[f32] = match &self.global_mean {
                    Some(m) => {
                        shifted = query.to_vec();
                        scalar::sub_in_place(&mut shifted, m);
                        &shifted
                    }
                    None => query,
                };
                TableInner::Assembled {
                    table: self
                        .fill_table(q, |q_sub, centroid| scalar::square_distance(q_sub, centroid)),
                    cluster_count: self.cluster_count,
                    bias: 0.0,
                    similarity,
                }
            }
        };
        Ok(PqScoreTable { inner })
    }

    fn fill_table<F>(&self, query: &[f32], mut kernel: F) -> Vec<f32>
    where
        F: FnMut(&[f32], &[f32]) -> f32,
    {
        let c_count = self.cluster_count;
        let mut table = vec![0.0f32; self.subspace_count() * c_count];
        for (s, (&size, &off)) in self.sizes.iter().zip(self.offsets.iter()).enumerate() {
            let q_sub = &query[off..off + size];
            for c in 0..c_count {
                let centroid = &self.codebooks[s][c * size..(c + 1) * size];
                table[s * c_count + c] = kernel(q_sub, centroid);
            }
        }
        table
    }

    /// Re-runs Lloyd refinement from this codec's centroids on a new
    /// vector set, returning the refined codec. Loss on the refine set
    /// strictly decreases relative to this codec unless it was already at
    /// a fixpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] if the view dimension
    /// differs, or [`DiskVecError::Config`] for an empty refine set.
    pub fn refine(&self, vectors: &dyn VectorValues) -> Result<Self> {
        if vectors.dimension() != self.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.dimension,
                actual: vectors.dimension(),
            });
        }
        if vectors.size() == 0 {
            return Err(DiskVecError::Config("refine set must not be empty".into()));
        }
        let projections = Self::project(
            vectors,
            &self.sizes,
            &self.offsets,
            self.global_mean.as_deref(),
        );
        let codebooks: Vec<Vec<f32>> = self
            .codebooks
            .par_iter()
            .zip(projections.into_par_iter())
            .enumerate()
            .map(|(s, (codebook, points))| {
                let mut refined = codebook.clone();
                kmeans::refine(&mut refined, &points, self.sizes[s], kmeans::MAX_ITERATIONS);
                refined
            })
            .collect();
        Ok(Self {
            codebooks,
            global_mean: self.global_mean.clone(),
            sizes: self.sizes.clone(),
            offsets: self.offsets.clone(),
            dimension: self.dimension,
            cluster_count: self.cluster_count,
        })
    }

    /// Mean squared reconstruction error of `vectors` under this codec.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn reconstruction_loss(&self, vectors: &dyn VectorValues) -> f64 {
        let n = vectors.size();
        if n == 0 {
            return 0.0;
        }
        let mut codes = vec![0u8; self.subspace_count()];
        let mut decoded = vec![0.0f32; self.dimension];
        let mut total = 0.0f64;
        for i in 0..n {
            let v = vectors.vector(i as u32);
            self.encode_into(&v, &mut codes)
                .expect("view dimension checked by caller");
            self.decode_into(&codes, &mut decoded);
            total += f64::from(scalar::square_distance(&v, &decoded));
        }
        total / n as f64
    }
}

enum TableInner<'a> {
    Assembled {
        table: Vec<f32>,
        cluster_count: usize,
        bias: f32,
        similarity: Similarity,
    },
    Decoded {
        query: Vec<f32>,
        similarity: Similarity,
        pq: &'a ProductQuantizer,
    },
}

/// Query-side score table produced by
/// [`ProductQuantizer::score_table`].
pub struct PqScoreTable<'a> {
    inner: TableInner<'a>,
}

impl PqScoreTable<'_> {
    /// Approximate similarity score of the encoded vector `codes`.
    #[must_use]
    pub fn score(&self, codes: &[u8]) -> f32 {
        match &self.inner {
            TableInner::Assembled {
                table,
                cluster_count,
                bias,
                similarity,
            } => {
                let raw = scalar::assemble_and_sum(table, *cluster_count, codes) + bias;
                similarity.score_from_raw(raw)
            }
            TableInner::Decoded {
                query,
                similarity,
                pq,
            } => {
                let decoded = pq.decode(codes);
                similarity.score(query, &decoded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::DenseVectorValues;
    use rand::Rng;

    fn random_vectors(n: usize, dim: usize, seed: u64) -> DenseVectorValues {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut v = DenseVectorValues::new(dim);
        for _ in 0..n {
            let row: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            v.push(&row).unwrap();
        }
        v
    }

    #[test]
    fn test_subvector_split_even_and_remainder() {
        let (sizes, offsets) = ProductQuantizer::subvector_sizes_and_offsets(8, 4);
        assert_eq!(sizes, vec![2, 2, 2, 2]);
        assert_eq!(offsets, vec![0, 2, 4, 6]);
        let (sizes, offsets) = ProductQuantizer::subvector_sizes_and_offsets(10, 3);
        assert_eq!(sizes, vec![3, 3, 4]);
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn test_train_validates_config() {
        let v = random_vectors(10, 4, 1);
        assert!(ProductQuantizer::train(&v, 0, 16, false, 1).is_err());
        assert!(ProductQuantizer::train(&v, 5, 16, false, 1).is_err());
        assert!(ProductQuantizer::train(&v, 2, 0, false, 1).is_err());
        assert!(ProductQuantizer::train(&v, 2, 257, false, 1).is_err());
        let empty = DenseVectorValues::new(4);
        assert!(ProductQuantizer::train(&empty, 2, 16, false, 1).is_err());
    }

    #[test]
    fn test_encode_rejects_wrong_dimension() {
        let v = random_vectors(20, 4, 2);
        let pq = ProductQuantizer::train(&v, 2, 8, false, 2).unwrap();
        assert!(pq.encode(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_perfect_reconstruction_with_enough_clusters() {
        // More clusters than distinct subspace values: decode(encode(v))
        // must reproduce v bit for bit.
        let v = random_vectors(256, 3, 3);
        let pq = ProductQuantizer::train(&v, 2, 256, false, 3).unwrap();
        for i in 0..v.size() {
            #[allow(clippy::cast_possible_truncation)]
            let original = v.get(i as u32);
            let decoded = pq.decode(&pq.encode(original).unwrap());
            assert_eq!(original, &decoded[..], "vector {i} must round-trip");
        }
    }

    #[test]
    fn test_mean_subtraction_roundtrip() {
        let v = random_vectors(64, 4, 4);
        let pq = ProductQuantizer::train(&v, 2, 64, true, 4).unwrap();
        assert!(pq.global_mean().is_some());
        // With that many clusters the reconstruction should be tight.
        assert!(pq.reconstruction_loss(&v) < 0.05);
    }

    #[test]
    fn test_assembled_table_matches_decode_for_dot() {
        let v = random_vectors(50, 6, 5);
        let pq = ProductQuantizer::train(&v, 3, 16, true, 5).unwrap();
        let query: Vec<f32> = vec![0.3, -0.2, 0.9, 0.1, -0.5, 0.4];
        let table = pq.score_table(&query, Similarity::DotProduct).unwrap();
        for i in 0..8u32 {
            let codes = pq.encode(v.get(i)).unwrap();
            let via_table = table.score(&codes);
            let via_decode =
                Similarity::DotProduct.score_from_raw(scalar::dot(&query, &pq.decode(&codes)));
            assert!(
                (via_table - via_decode).abs() < 1e-4,
                "table and decode disagree: {via_table} vs {via_decode}"
            );
        }
    }

    #[test]
    fn test_assembled_table_matches_decode_for_euclidean() {
        let v = random_vectors(50, 6, 6);
        let pq = ProductQuantizer::train(&v, 3, 16, true, 6).unwrap();
        let query: Vec<f32> = vec![0.1, 0.2, -0.3, 0.4, -0.5, 0.6];
        let table = pq.score_table(&query, Similarity::Euclidean).unwrap();
        for i in 0..8u32 {
            let codes = pq.encode(v.get(i)).unwrap();
            let via_table = table.score(&codes);
            let via_decode = Similarity::Euclidean
                .score_from_raw(scalar::square_distance(&query, &pq.decode(&codes)));
            assert!((via_table - via_decode).abs() < 1e-4);
        }
    }

    #[test]
    fn test_refine_strictly_improves_loss() {
        let train = random_vectors(200, 4, 7);
        let refine_set = random_vectors(200, 4, 8);
        let pq = ProductQuantizer::train(&train, 2, 8, false, 7).unwrap();
        let before = pq.reconstruction_loss(&refine_set);
        let refined = pq.refine(&refine_set).unwrap();
        let after = refined.reconstruction_loss(&refine_set);
        assert!(
            after < before,
            "refine must reduce loss on the refine set: {after} vs {before}"
        );
    }

    #[test]
    fn test_from_parts_validates() {
        let v = random_vectors(20, 4, 9);
        let pq = ProductQuantizer::train(&v, 2, 8, false, 9).unwrap();
        let rebuilt = ProductQuantizer::from_parts(
            pq.sizes().to_vec(),
            pq.cluster_count(),
            (0..pq.subspace_count()).map(|s| pq.codebook(s).to_vec()).collect(),
            None,
        )
        .unwrap();
        assert_eq!(rebuilt, pq);

        assert!(ProductQuantizer::from_parts(vec![2, 2], 8, vec![vec![0.0; 3]], None).is_err());
        assert!(
            ProductQuantizer::from_parts(vec![2], 8, vec![vec![0.0; 16]], Some(vec![0.0; 5]))
                .is_err()
        );
    }
}
