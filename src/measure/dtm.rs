//! Distance to Measure
//!
//! The distance to measure of a location y with respect to a (weighted)
//! point set is an r-power mean of the distances from y to its nearest
//! points, taken until a mass budget m0 * (total weight) is used up:
//!
//!   DTM(y)^r = (1 / m) * [ Σ_{i<b} wᵢ dᵢ^r + d_b^r * (m - Σ_{i<b} wᵢ) ]
//!
//! where neighbours are sorted by distance, m is the budget and b is the
//! first neighbour whose cumulative weight reaches m. The boundary neighbour
//! only contributes the part of its weight that fills the budget, which makes
//! the statistic continuous in the weights.
//!
//! Compared to the plain nearest-neighbour distance, the DTM is robust to
//! outliers: a single stray point only moves it by a fraction of m.
//!
//! ## Unweighted case
//!
//! Every point weighs 1, so m = m0 * M and b = ceil(m) - 1.
//!
//! ## Reference
//!
//! Chazal, Cohen-Steiner, Mérigot (2011). "Geometric Inference for
//! Probability Measures". Foundations of Computational Mathematics.

use std::sync::Arc;

use ndarray::{Array1, ArrayView1, ArrayView2};

use super::grid::Grid;
use super::knn::{knn, KnnResult, Metric};
use crate::error::{Result, TopoError};

/// Lower bound applied to DTM values used as denominators in derivatives
pub const DTM_FLOOR: f64 = 1e-12;

/// DTM evaluator over a fixed grid
#[derive(Debug, Clone)]
pub struct DistanceToMeasure {
    grid: Arc<Grid>,
    m0: f64,
    metric: Metric,
}

/// Unweighted DTM field together with what its Jacobian needs
#[derive(Debug, Clone)]
pub struct UnweightedDtm {
    /// DTM value per grid point, shape [N]
    pub values: Array1<f64>,
    /// Neighbour lists, k = ceil(m0 * M)
    pub knn: KnnResult,
    /// Mass budget m0 * M
    pub weight_bound: f64,
    /// Metric used for distances and the power mean
    pub metric: Metric,
}

/// Weighted DTM field together with what its Jacobians need
#[derive(Debug, Clone)]
pub struct WeightedDtm {
    /// DTM value per grid point, shape [N]
    pub values: Array1<f64>,
    /// Neighbour lists, truncated to the largest boundary index + 1
    pub knn: KnnResult,
    /// Weight of each neighbour, aligned with `knn.indices`
    pub neighbor_weights: ndarray::Array2<f64>,
    /// Slot of the boundary neighbour for each grid point
    pub boundary: Vec<usize>,
    /// Mass budget m0 * Σ weights
    pub weight_bound: f64,
    /// Mass fraction m0
    pub m0: f64,
    /// Number of input points M
    pub n_points: usize,
    /// Metric used for distances and the power mean
    pub metric: Metric,
}

impl DistanceToMeasure {
    /// Create an evaluator for mass fraction `m0` in (0, 1]
    pub fn new(grid: Arc<Grid>, m0: f64, metric: Metric) -> Result<Self> {
        if !(m0 > 0.0 && m0 <= 1.0) {
            return Err(TopoError::invalid_parameter(
                "m0",
                format!("must lie in (0, 1], got {}", m0),
            ));
        }
        if metric.exponent() < 1.0 || !metric.exponent().is_finite() {
            return Err(TopoError::invalid_parameter(
                "r",
                "metric exponent must be finite and >= 1",
            ));
        }
        Ok(Self { grid, m0, metric })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn m0(&self) -> f64 {
        self.m0
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// DTM of an unweighted point set [M, d] at every grid point
    pub fn evaluate(&self, points: ArrayView2<'_, f64>) -> Result<UnweightedDtm> {
        self.check_points(points)?;

        let m = points.nrows();
        let weight_bound = self.m0 * m as f64;
        let k = (weight_bound.ceil() as usize).clamp(1, m);
        let last = k - 1;

        let knn = knn(points, self.grid.points(), k, self.metric)?;

        let values = knn
            .distances
            .rows()
            .into_iter()
            .map(|row| {
                let inside: f64 = row.iter().take(last).map(|&d| self.metric.power(d)).sum();
                let partial = self.metric.power(row[last]) * (weight_bound - last as f64);
                self.metric.root((inside + partial) / weight_bound)
            })
            .collect::<Array1<f64>>();

        Ok(UnweightedDtm {
            values,
            knn,
            weight_bound,
            metric: self.metric,
        })
    }

    /// DTM of a weighted point set at every grid point
    ///
    /// Neighbours are ranked by distance only; weights decide how many of
    /// them fit in the budget. The neighbour count is recomputed on every
    /// call since it depends on the weights.
    pub fn evaluate_weighted(
        &self,
        points: ArrayView2<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<WeightedDtm> {
        self.check_points(points)?;

        let m = points.nrows();
        if weights.len() != m {
            return Err(TopoError::dimension_mismatch("weights vs points", m, weights.len()));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(TopoError::degenerate_weights(format!(
                "weights must be finite and non-negative, found {}",
                w
            )));
        }
        let total: f64 = weights.sum();
        if !(total > 0.0) {
            return Err(TopoError::degenerate_weights("total weight is zero, mass budget is empty"));
        }
        let weight_bound = self.m0 * total;

        // Any k points weigh at least as much as the k lightest ones, so this
        // count reaches the budget at every grid point.
        let k_bound = sufficient_neighbors(weights, weight_bound);
        if k_bound == 0 {
            return Err(TopoError::degenerate_weights("required neighbour count is zero"));
        }

        let full = knn(points, self.grid.points(), k_bound, self.metric)?;

        let boundary: Vec<usize> = full
            .indices
            .rows()
            .into_iter()
            .map(|row| boundary_slot(row.iter().map(|&j| weights[j]), weight_bound, k_bound))
            .collect();

        let k = boundary.iter().max().map_or(0, |&b| b + 1);
        if k == 0 {
            return Err(TopoError::degenerate_weights("required neighbour count is zero"));
        }
        let knn = full.truncate(k);
        let neighbor_weights = knn.indices.mapv(|j| weights[j]);

        let values = knn
            .distances
            .rows()
            .into_iter()
            .zip(neighbor_weights.rows())
            .zip(&boundary)
            .map(|((dists, ws), &b)| {
                let mut acc = 0.0;
                let mut used = 0.0;
                for i in 0..b {
                    acc += ws[i] * self.metric.power(dists[i]);
                    used += ws[i];
                }
                acc += self.metric.power(dists[b]) * (weight_bound - used);
                self.metric.root(acc / weight_bound)
            })
            .collect::<Array1<f64>>();

        log::trace!(
            "weighted DTM: budget {:.4}, neighbour bound {}, used {}",
            weight_bound,
            k_bound,
            k
        );

        Ok(WeightedDtm {
            values,
            knn,
            neighbor_weights,
            boundary,
            weight_bound,
            m0: self.m0,
            n_points: m,
            metric: self.metric,
        })
    }

    fn check_points(&self, points: ArrayView2<'_, f64>) -> Result<()> {
        if points.ncols() != self.grid.dimension() {
            return Err(TopoError::dimension_mismatch(
                "points vs grid",
                self.grid.dimension(),
                points.ncols(),
            ));
        }
        if points.nrows() == 0 {
            return Err(TopoError::empty_input("point set has no points"));
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(TopoError::non_finite("point coordinates"));
        }
        Ok(())
    }
}

/// Smallest count of the lightest weights whose sum reaches the budget
fn sufficient_neighbors(weights: ArrayView1<'_, f64>, weight_bound: f64) -> usize {
    let mut sorted = weights.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut cumulative = 0.0;
    for (i, w) in sorted.iter().enumerate() {
        cumulative += w;
        if cumulative >= weight_bound {
            return i + 1;
        }
    }
    // Rounding kept the full sum just below the budget
    sorted.len()
}

/// First slot whose cumulative weight reaches the budget
fn boundary_slot(weights: impl Iterator<Item = f64>, weight_bound: f64, k: usize) -> usize {
    let mut cumulative = 0.0;
    for (slot, w) in weights.enumerate() {
        cumulative += w;
        if cumulative >= weight_bound {
            return slot;
        }
    }
    k - 1
}
