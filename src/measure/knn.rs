//! Brute-Force k-Nearest Neighbours
//!
//! For every grid point, find the k input points closest to it under an Lr
//! metric. The grid is fixed while the inputs change on every call; each grid
//! point scans every input and keeps the k best by partial selection.
//!
//! Ties are broken by input index: among equidistant points the one that
//! appears first in the input wins.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopoError};

/// Lr distance between points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    /// r = 1
    Manhattan,
    /// r = 2
    Euclidean,
    /// General r >= 1
    Minkowski(f64),
}

impl Metric {
    /// Metric for exponent r, using the specialised variants for 1 and 2
    pub fn from_exponent(r: f64) -> Self {
        if r == 1.0 {
            Metric::Manhattan
        } else if r == 2.0 {
            Metric::Euclidean
        } else {
            Metric::Minkowski(r)
        }
    }

    /// The exponent r
    pub fn exponent(&self) -> f64 {
        match *self {
            Metric::Manhattan => 1.0,
            Metric::Euclidean => 2.0,
            Metric::Minkowski(r) => r,
        }
    }

    /// Distance between two points of equal dimension
    pub fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match *self {
            Metric::Manhattan => diffs.sum(),
            Metric::Euclidean => diffs.map(|v| v * v).sum::<f64>().sqrt(),
            Metric::Minkowski(r) => diffs.map(|v| v.powf(r)).sum::<f64>().powf(1.0 / r),
        }
    }

    /// d^r, the quantity averaged by the distance to measure
    pub fn power(&self, distance: f64) -> f64 {
        match *self {
            Metric::Manhattan => distance,
            Metric::Euclidean => distance * distance,
            Metric::Minkowski(r) => distance.powf(r),
        }
    }

    /// Inverse of `power`
    pub fn root(&self, value: f64) -> f64 {
        match *self {
            Metric::Manhattan => value,
            Metric::Euclidean => value.sqrt(),
            Metric::Minkowski(r) => value.powf(1.0 / r),
        }
    }

    /// Derivative of d^r / r with respect to one coordinate difference
    ///
    /// For every Lr metric this is sign(delta) * |delta|^(r-1).
    pub fn power_gradient(&self, delta: f64) -> f64 {
        match *self {
            Metric::Manhattan if delta == 0.0 => 0.0,
            Metric::Manhattan => delta.signum(),
            Metric::Euclidean => delta,
            Metric::Minkowski(_) if delta == 0.0 => 0.0,
            Metric::Minkowski(r) => delta.signum() * delta.abs().powf(r - 1.0),
        }
    }
}

/// Neighbour lists for every grid point
#[derive(Debug, Clone)]
pub struct KnnResult {
    /// Distances, shape [N, k], ascending along each row
    pub distances: Array2<f64>,
    /// Input point indices, shape [N, k]
    pub indices: Array2<usize>,
}

impl KnnResult {
    /// Number of neighbours per grid point
    pub fn k(&self) -> usize {
        self.indices.ncols()
    }

    /// Keep only the first `k` neighbours of every grid point
    pub fn truncate(&self, k: usize) -> Self {
        let k = k.min(self.k());
        Self {
            distances: self.distances.slice(ndarray::s![.., ..k]).to_owned(),
            indices: self.indices.slice(ndarray::s![.., ..k]).to_owned(),
        }
    }
}

/// For each grid point, the k nearest input points
///
/// # Arguments
/// * `points` - Input points, shape [M, d]
/// * `grid` - Reference grid, shape [N, d]
/// * `k` - Number of neighbours, 1 <= k <= M
/// * `metric` - Distance used for ranking
pub fn knn(
    points: ArrayView2<'_, f64>,
    grid: ArrayView2<'_, f64>,
    k: usize,
    metric: Metric,
) -> Result<KnnResult> {
    if points.ncols() != grid.ncols() {
        return Err(TopoError::dimension_mismatch("points vs grid", grid.ncols(), points.ncols()));
    }
    let m = points.nrows();
    if k == 0 || k > m {
        return Err(TopoError::invalid_parameter(
            "k",
            format!("need 1 <= k <= {} input points, got {}", m, k),
        ));
    }

    let n = grid.nrows();
    let mut distances = Array2::<f64>::zeros((n, k));
    let mut indices = Array2::<usize>::zeros((n, k));

    let by_distance = |a: &(f64, usize), b: &(f64, usize)| -> Ordering {
        a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
    };

    let mut candidates: Vec<(f64, usize)> = Vec::with_capacity(m);
    for (g, target) in grid.axis_iter(Axis(0)).enumerate() {
        candidates.clear();
        candidates.extend(
            points
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(j, p)| (metric.distance(p, target), j)),
        );

        if k < m {
            candidates.select_nth_unstable_by(k - 1, by_distance);
        }
        let nearest = &mut candidates[..k];
        nearest.sort_unstable_by(by_distance);

        for (slot, &(dist, j)) in nearest.iter().enumerate() {
            distances[[g, slot]] = dist;
            indices[[g, slot]] = j;
        }
    }

    Ok(KnnResult { distances, indices })
}

/// k nearest neighbours for every sample of a batch [B, M, d]
///
/// Samples are independent and evaluated in parallel; results keep the
/// batch order.
pub fn knn_batch(
    points: ArrayView3<'_, f64>,
    grid: ArrayView2<'_, f64>,
    k: usize,
    metric: Metric,
) -> Result<Vec<KnnResult>> {
    let samples: Vec<ArrayView2<'_, f64>> = points.outer_iter().collect();
    samples
        .into_par_iter()
        .map(|sample| knn(sample, grid, k, metric))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_eq!(Metric::Manhattan.distance(a.view(), b.view()), 7.0);
        assert_eq!(Metric::Euclidean.distance(a.view(), b.view()), 5.0);
        let d3 = Metric::Minkowski(3.0).distance(a.view(), b.view());
        assert!((d3 - (27.0f64 + 64.0).powf(1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_knn_sorted() {
        let points = array![[0.0], [5.0], [1.0], [3.0]];
        let grid = array![[0.0], [4.0]];

        let result = knn(points.view(), grid.view(), 3, Metric::Euclidean).unwrap();

        assert_eq!(result.indices.row(0).to_vec(), vec![0, 2, 3]);
        assert_eq!(result.distances.row(0).to_vec(), vec![0.0, 1.0, 3.0]);
        assert_eq!(result.indices.row(1).to_vec(), vec![1, 3, 2]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let points = array![[2.0], [-1.0], [1.0], [-2.0]];
        let grid = array![[0.0]];

        let result = knn(points.view(), grid.view(), 4, Metric::Manhattan).unwrap();

        assert_eq!(result.indices.row(0).to_vec(), vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let points = array![[0.0, 1.0]];
        let grid = array![[0.0]];
        assert!(matches!(
            knn(points.view(), grid.view(), 1, Metric::Euclidean),
            Err(TopoError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_k_out_of_range() {
        let points = array![[0.0], [1.0]];
        let grid = array![[0.0]];
        assert!(knn(points.view(), grid.view(), 0, Metric::Euclidean).is_err());
        assert!(knn(points.view(), grid.view(), 3, Metric::Euclidean).is_err());
    }

    #[test]
    fn test_batch_matches_single() {
        let mut batch = Array3::<f64>::zeros((3, 4, 2));
        for b in 0..3 {
            for j in 0..4 {
                batch[[b, j, 0]] = (b * 4 + j) as f64 * 0.3;
                batch[[b, j, 1]] = -(j as f64) * 0.7 + b as f64;
            }
        }
        let grid = array![[0.0, 0.0], [1.0, 1.0], [2.0, -1.0]];

        let results = knn_batch(batch.view(), grid.view(), 2, Metric::Euclidean).unwrap();
        assert_eq!(results.len(), 3);
        for (b, result) in results.iter().enumerate() {
            let single =
                knn(batch.index_axis(Axis(0), b), grid.view(), 2, Metric::Euclidean).unwrap();
            assert_eq!(result.indices, single.indices);
            assert_eq!(result.distances, single.distances);
        }
    }
}
