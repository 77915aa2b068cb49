//! k-means clustering for codebook training.
//!
//! Seeding is k-means++ (probabilistic farthest-point); refinement is Lloyd
//! iteration until centroid movement falls below a tolerance or an
//! iteration cap. Assignment ties break toward the lower centroid index,
//! which keeps training deterministic for a fixed seed.

use crate::metric::scalar;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Lloyd iteration cap per training run.
pub(crate) const MAX_ITERATIONS: usize = 16;

/// Total squared centroid movement below which Lloyd iteration stops.
const MOVE_TOLERANCE: f32 = 1e-7;

/// A trained set of centroids and its loss on the training points.
pub(crate) struct Clustering {
    /// `k * dim` centroid coordinates, centroid-major.
    pub centroids: Vec<f32>,
    /// Sum of squared distances from each point to its centroid.
    pub loss: f64,
}

#[inline]
fn point(points: &[f32], dim: usize, i: usize) -> &[f32] {
    &points[i * dim..(i + 1) * dim]
}

/// Index and squared distance of the nearest centroid; ties go to the
/// lower index.
pub(crate) fn nearest(p: &[f32], centroids: &[f32], dim: usize) -> (usize, f32) {
    let k = centroids.len() / dim;
    let mut best = 0;
    let mut best_d2 = f32::MAX;
    for c in 0..k {
        let d2 = scalar::square_distance(p, point(centroids, dim, c));
        if d2 < best_d2 {
            best = c;
            best_d2 = d2;
        }
    }
    (best, best_d2)
}

/// Sum of squared distances from every point to its nearest centroid.
pub(crate) fn compute_loss(centroids: &[f32], points: &[f32], dim: usize) -> f64 {
    let n = points.len() / dim;
    (0..n)
        .map(|i| f64::from(nearest(point(points, dim, i), centroids, dim).1))
        .sum()
}

/// One Lloyd step: assign every point, then move each centroid to the mean
/// of its assignment. Empty clusters keep their position. Returns the
/// total squared centroid movement.
pub(crate) fn lloyd_step(centroids: &mut [f32], points: &[f32], dim: usize) -> f32 {
    let k = centroids.len() / dim;
    let n = points.len() / dim;
    let mut sums = vec![0.0f64; k * dim];
    let mut counts = vec![0usize; k];
    for i in 0..n {
        let p = point(points, dim, i);
        let (c, _) = nearest(p, centroids, dim);
        counts[c] += 1;
        for (d, &v) in p.iter().enumerate() {
            sums[c * dim + d] += f64::from(v);
        }
    }
    let mut moved = 0.0f32;
    for c in 0..k {
        if counts[c] == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let inv = 1.0 / counts[c] as f64;
        for d in 0..dim {
            #[allow(clippy::cast_possible_truncation)]
            let new = (sums[c * dim + d] * inv) as f32;
            let old = centroids[c * dim + d];
            let delta = new - old;
            moved += delta * delta;
            centroids[c * dim + d] = new;
        }
    }
    moved
}

/// Runs Lloyd refinement from the given centroids; returns the loss of the
/// final centroids.
pub(crate) fn refine(centroids: &mut [f32], points: &[f32], dim: usize, iterations: usize) -> f64 {
    for _ in 0..iterations {
        let moved = lloyd_step(centroids, points, dim);
        if moved < MOVE_TOLERANCE {
            break;
        }
    }
    compute_loss(centroids, points, dim)
}

/// When the points hold at most `k` distinct values, every distinct value
/// becomes a centroid (padded by repeats) and reconstruction is exact.
fn distinct_shortcut(points: &[f32], dim: usize, k: usize) -> Option<Vec<f32>> {
    let n = points.len() / dim;
    let mut distinct: Vec<&[f32]> = Vec::new();
    for i in 0..n {
        let p = point(points, dim, i);
        if !distinct.iter().any(|d| *d == p) {
            if distinct.len() == k {
                return None;
            }
            distinct.push(p);
        }
    }
    let mut centroids = Vec::with_capacity(k * dim);
    for d in &distinct {
        centroids.extend_from_slice(d);
    }
    // Pad with repeats of the first value; assignment ties resolve to the
    // lower index, so the padding never captures a point.
    while centroids.len() < k * dim {
        centroids.extend_from_slice(distinct[0]);
    }
    Some(centroids)
}

/// k-means++ seeding: the first centroid is uniform, each later one is
/// sampled with probability proportional to squared distance from the
/// chosen set.
fn seed_plus_plus(points: &[f32], dim: usize, k: usize, rng: &mut ChaCha8Rng) -> Vec<f32> {
    let n = points.len() / dim;
    let mut centroids = Vec::with_capacity(k * dim);
    let first = rng.gen_range(0..n);
    centroids.extend_from_slice(point(points, dim, first));

    let mut dist2: Vec<f32> = (0..n)
        .map(|i| scalar::square_distance(point(points, dim, i), point(points, dim, first)))
        .collect();

    for _ in 1..k {
        let total: f64 = dist2.iter().map(|&d| f64::from(d)).sum();
        let pick = if total <= 0.0 {
            rng.gen_range(0..n)
        } else {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = n - 1;
            for (i, &d) in dist2.iter().enumerate() {
                target -= f64::from(d);
                if target <= 0.0 {
                    pick = i;
                    break;
                }
            }
            pick
        };
        let chosen = point(points, dim, pick).to_vec();
        for (i, d) in dist2.iter_mut().enumerate() {
            let cand = scalar::square_distance(point(points, dim, i), &chosen);
            if cand < *d {
                *d = cand;
            }
        }
        centroids.extend_from_slice(&chosen);
    }
    centroids
}

/// Full training run: seed, then refine.
pub(crate) fn cluster(points: &[f32], dim: usize, k: usize, rng: &mut ChaCha8Rng) -> Clustering {
    debug_assert!(dim > 0 && k > 0 && points.len() % dim == 0);
    let mut centroids = match distinct_shortcut(points, dim, k) {
        Some(c) => c,
        None => seed_plus_plus(points, dim, k, rng),
    };
    let loss = refine(&mut centroids, points, dim, MAX_ITERATIONS);
    Clustering { centroids, loss }
}

/// Anisotropic assignment cost of centroid `c` for point `p`.
///
/// The residual decomposes into the component parallel to `p` and the rest;
/// the parallel part (which distorts dot products against queries aligned
/// with `p`) is weighted by `eta`. At `eta = 1` this is exactly the squared
/// distance. Zero-norm points fall back to the isotropic cost.
fn anisotropic_cost(p: &[f32], c: &[f32], eta: f32) -> f32 {
    let mut rr = 0.0f32;
    let mut rp = 0.0f32;
    let mut pp = 0.0f32;
    for (x, y) in p.iter().zip(c.iter()) {
        let r = x - y;
        rr += r * r;
        rp += r * x;
        pp += x * x;
    }
    if pp <= 0.0 {
        return rr;
    }
    let parallel = (rp * rp) / pp;
    rr + (eta - 1.0) * parallel
}

/// Index and cost of the cheapest centroid under the anisotropic loss;
/// ties go to the lower index.
fn anisotropic_nearest(p: &[f32], centroids: &[f32], dim: usize, eta: f32) -> (usize, f32) {
    let k = centroids.len() / dim;
    let mut best = 0;
    let mut best_cost = f32::MAX;
    for c in 0..k {
        let cost = anisotropic_cost(p, point(centroids, dim, c), eta);
        if cost < best_cost {
            best = c;
            best_cost = cost;
        }
    }
    (best, best_cost)
}

/// One Lloyd step under the anisotropic assignment.
///
/// Assignment minimizes the weighted cost; the update keeps the plain
/// per-cluster mean, which is the standard Lloyd update applied to the
/// anisotropic partition. Returns the total squared centroid movement.
fn anisotropic_lloyd_step(centroids: &mut [f32], points: &[f32], dim: usize, eta: f32) -> f32 {
    let k = centroids.len() / dim;
    let n = points.len() / dim;
    let mut sums = vec![0.0f64; k * dim];
    let mut counts = vec![0usize; k];
    for i in 0..n {
        let p = point(points, dim, i);
        let (c, _) = anisotropic_nearest(p, centroids, dim, eta);
        counts[c] += 1;
        for (d, &v) in p.iter().enumerate() {
            sums[c * dim + d] += f64::from(v);
        }
    }
    let mut moved = 0.0f32;
    for c in 0..k {
        if counts[c] == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        let inv = 1.0 / counts[c] as f64;
        for d in 0..dim {
            #[allow(clippy::cast_possible_truncation)]
            let new = (sums[c * dim + d] * inv) as f32;
            let old = centroids[c * dim + d];
            let delta = new - old;
            moved += delta * delta;
            centroids[c * dim + d] = new;
        }
    }
    moved
}

/// Total anisotropic cost of the points under the centroids.
pub(crate) fn anisotropic_loss(centroids: &[f32], points: &[f32], dim: usize, eta: f32) -> f64 {
    let n = points.len() / dim;
    (0..n)
        .map(|i| f64::from(anisotropic_nearest(point(points, dim, i), centroids, dim, eta).1))
        .sum()
}

/// Anisotropic training run: standard seeding, then Lloyd refinement under
/// the weighted assignment.
pub(crate) fn cluster_anisotropic(
    points: &[f32],
    dim: usize,
    k: usize,
    eta: f32,
    rng: &mut ChaCha8Rng,
) -> Clustering {
    debug_assert!(dim > 0 && k > 0 && points.len() % dim == 0);
    let mut centroids = match distinct_shortcut(points, dim, k) {
        Some(c) => c,
        None => seed_plus_plus(points, dim, k, rng),
    };
    for _ in 0..MAX_ITERATIONS {
        let moved = anisotropic_lloyd_step(&mut centroids, points, dim, eta);
        if moved < MOVE_TOLERANCE {
            break;
        }
    }
    let loss = anisotropic_loss(&centroids, points, dim, eta);
    Clustering { centroids, loss }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gaussian_points(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        // Box-Muller from a seeded uniform source.
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut out = Vec::with_capacity(n * dim);
        while out.len() < n * dim {
            let u1: f32 = rng.gen::<f32>().max(1e-9);
            let u2: f32 = rng.gen();
            let r = (-2.0 * u1.ln()).sqrt();
            out.push(r * (2.0 * std::f32::consts::PI * u2).cos());
            out.push(r * (2.0 * std::f32::consts::PI * u2).sin());
        }
        out.truncate(n * dim);
        out
    }

    #[test]
    fn test_nearest_breaks_ties_low() {
        let centroids = [0.0, 0.0, 0.0, 0.0]; // two identical 2-d centroids
        let (c, _) = nearest(&[1.0, 1.0], &centroids, 2);
        assert_eq!(c, 0);
    }

    #[test]
    fn test_lloyd_step_monotone_until_fixpoint() {
        let points = gaussian_points(200, 2, 7);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut centroids = seed_plus_plus(&points, 2, 8, &mut rng);
        let mut prev = compute_loss(&centroids, &points, 2);
        for _ in 0..20 {
            let moved = lloyd_step(&mut centroids, &points, 2);
            let loss = compute_loss(&centroids, &points, 2);
            if moved == 0.0 {
                assert!((loss - prev).abs() < 1e-9, "fixpoint must hold its loss");
                break;
            }
            assert!(loss < prev, "a moving step must strictly reduce loss");
            prev = loss;
        }
    }

    #[test]
    fn test_distinct_shortcut_is_exact() {
        // Four distinct points, k = 4: every point becomes a centroid.
        let points = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let result = cluster(&points, 2, 4, &mut rng);
        assert!(result.loss < 1e-12);
    }

    #[test]
    fn test_cluster_handles_k_above_distinct_count() {
        // Two distinct values, k = 5: padding must not capture points.
        let points = [1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let result = cluster(&points, 1, 5, &mut rng);
        assert!(result.loss < 1e-12);
    }

    #[test]
    fn test_anisotropic_eta_one_matches_standard() {
        // eta = 1 makes the anisotropic cost collapse to the squared
        // distance, so training must agree bit for bit.
        let points = gaussian_points(150, 2, 13);
        let mut r1 = ChaCha8Rng::seed_from_u64(17);
        let mut r2 = ChaCha8Rng::seed_from_u64(17);
        let standard = cluster(&points, 2, 8, &mut r1);
        let weighted = cluster_anisotropic(&points, 2, 8, 1.0, &mut r2);
        assert_eq!(standard.centroids, weighted.centroids);
    }

    #[test]
    fn test_anisotropic_cost_weights_parallel_residual() {
        let p = [1.0f32, 0.0];
        // Residual purely parallel to p.
        let parallel = [0.5f32, 0.0];
        // Residual of the same norm, orthogonal to p.
        let orthogonal = [1.0f32, 0.5];
        let eta = 4.0;
        let par_cost = anisotropic_cost(&p, &parallel, eta);
        let orth_cost = anisotropic_cost(&p, &orthogonal, eta);
        assert!(
            par_cost > orth_cost,
            "parallel error must cost more under eta > 1: {par_cost} vs {orth_cost}"
        );
        // eta = 1 is the plain squared distance for both.
        assert!((anisotropic_cost(&p, &parallel, 1.0) - 0.25).abs() < 1e-6);
        assert!((anisotropic_cost(&p, &orthogonal, 1.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_cluster_deterministic_for_seed() {
        let points = gaussian_points(100, 3, 21);
        let mut r1 = ChaCha8Rng::seed_from_u64(5);
        let mut r2 = ChaCha8Rng::seed_from_u64(5);
        let a = cluster(&points, 3, 4, &mut r1);
        let b = cluster(&points, 3, 4, &mut r2);
        assert_eq!(a.centroids, b.centroids);
    }
}
