//! Analytic Jacobians of the Distance to Measure
//!
//! A DTM value depends only on its contributing neighbours, so each row of
//! the Jacobian is computed over the k neighbour slots and scattered into a
//! dense [N, M, ...] buffer by neighbour index.
//!
//! ## Points
//!
//! With Δ = xⱼ - y and the same Lr metric used for ranking,
//! ∂(dᵢ^r / r)/∂xⱼ = sign(Δ) |Δ|^(r-1), which gives
//!
//!   ∂DTM/∂xⱼ = cⱼ sign(Δ) |Δ|^(r-1) / (m * DTM^(r-1))
//!
//! where cⱼ is the neighbour's weight inside the budget and the remaining
//! budget m - Σ_{i<b} wᵢ for the boundary neighbour b.
//!
//! ## Weights
//!
//! The budget m = m0 Σ w depends on every weight, so every input point gets
//! the m0 terms, while only neighbours inside the budget get the first term:
//!
//!   ∂DTM/∂wₗ = ([l inside] (Dₗ - D_b) + m0 D_b - m0 DTM^r) / (r m DTM^(r-1))
//!
//! with D = d^r.
//!
//! Both are exact derivatives of the forward rule everywhere except where a
//! cumulative weight crosses the budget (measure zero).
//!
//! DTM^(r-1) is evaluated on max(DTM, DTM_FLOOR) so that a field that
//! vanishes at a grid point yields a zero row instead of NaN.

use ndarray::{Array2, Array3, ArrayView2, Axis};

use super::dtm::{UnweightedDtm, WeightedDtm, DTM_FLOOR};
use super::grid::Grid;
use super::knn::{KnnResult, Metric};
use crate::error::{Result, TopoError};
use crate::scatter::scatter_add;

impl UnweightedDtm {
    /// ∂DTM/∂points, shape [N, M, d]
    pub fn jacobian(&self, points: ArrayView2<'_, f64>, grid: &Grid) -> Result<Array3<f64>> {
        check_shapes(&self.knn, points, grid)?;

        let k = self.knn.k();
        let last = k - 1;
        let boundary_share = self.weight_bound - last as f64;

        Ok(point_jacobian(
            &self.values,
            &self.knn,
            points,
            grid,
            self.metric,
            self.weight_bound,
            |_| {
                let mut coefficients = vec![1.0; k];
                coefficients[last] = boundary_share;
                coefficients
            },
        ))
    }
}

impl WeightedDtm {
    /// ∂DTM/∂points, shape [N, M, d]
    pub fn point_jacobian(&self, points: ArrayView2<'_, f64>, grid: &Grid) -> Result<Array3<f64>> {
        check_shapes(&self.knn, points, grid)?;
        if points.nrows() != self.n_points {
            return Err(TopoError::dimension_mismatch(
                "points vs forward pass",
                self.n_points,
                points.nrows(),
            ));
        }

        Ok(point_jacobian(
            &self.values,
            &self.knn,
            points,
            grid,
            self.metric,
            self.weight_bound,
            |g| {
                let b = self.boundary[g];
                let ws = self.neighbor_weights.row(g);
                let mut coefficients: Vec<f64> = ws.iter().take(b).copied().collect();
                let used: f64 = coefficients.iter().sum();
                coefficients.push(self.weight_bound - used);
                coefficients
            },
        ))
    }

    /// ∂DTM/∂weights, shape [N, M]
    pub fn weight_jacobian(&self) -> Array2<f64> {
        let n = self.values.len();
        let r = self.metric.exponent();
        let mut jac = Array2::<f64>::zeros((n, self.n_points));

        for (g, mut row) in jac.axis_iter_mut(Axis(0)).enumerate() {
            let b = self.boundary[g];
            let dists = self.knn.distances.row(g);
            let boundary_power = self.metric.power(dists[b]);

            let inside: Vec<usize> = self.knn.indices.row(g).iter().take(b).copied().collect();
            let updates: ndarray::Array1<f64> = dists
                .iter()
                .take(b)
                .map(|&d| self.metric.power(d) - boundary_power)
                .collect();
            scatter_add(row.view_mut(), &inside, updates.view());

            let dtm = self.values[g];
            let shared = self.m0 * boundary_power - self.m0 * self.metric.power(dtm);
            let scale = 1.0 / (r * self.weight_bound * dtm.max(DTM_FLOOR).powf(r - 1.0));
            row.mapv_inplace(|v| (v + shared) * scale);
        }

        jac
    }
}

fn check_shapes(knn: &KnnResult, points: ArrayView2<'_, f64>, grid: &Grid) -> Result<()> {
    if points.ncols() != grid.dimension() {
        return Err(TopoError::dimension_mismatch(
            "points vs grid",
            grid.dimension(),
            points.ncols(),
        ));
    }
    if knn.indices.nrows() != grid.len() {
        return Err(TopoError::dimension_mismatch(
            "forward pass vs grid",
            grid.len(),
            knn.indices.nrows(),
        ));
    }
    if let Some(&j) = knn.indices.iter().find(|&&j| j >= points.nrows()) {
        return Err(TopoError::dimension_mismatch("points vs forward pass", j + 1, points.nrows()));
    }
    Ok(())
}

/// Scatter per-neighbour point derivatives into a dense [N, M, d] tensor
///
/// `coefficients(g)` gives the mass each contributing neighbour slot of grid
/// point g carries; slots beyond its length do not contribute.
fn point_jacobian<F>(
    values: &ndarray::Array1<f64>,
    knn: &KnnResult,
    points: ArrayView2<'_, f64>,
    grid: &Grid,
    metric: Metric,
    weight_bound: f64,
    coefficients: F,
) -> Array3<f64>
where
    F: Fn(usize) -> Vec<f64>,
{
    let (n, m, d) = (grid.len(), points.nrows(), points.ncols());
    let r = metric.exponent();
    let grid_points = grid.points();
    let mut jac = Array3::<f64>::zeros((n, m, d));

    for g in 0..n {
        let coefficients = coefficients(g);
        let targets: Vec<usize> =
            knn.indices.row(g).iter().take(coefficients.len()).copied().collect();
        let denominator = weight_bound * values[g].max(DTM_FLOOR).powf(r - 1.0);

        let mut updates = Array2::<f64>::zeros((targets.len(), d));
        for (slot, (&j, &c)) in targets.iter().zip(&coefficients).enumerate() {
            for axis in 0..d {
                let delta = points[[j, axis]] - grid_points[[g, axis]];
                updates[[slot, axis]] = c * metric.power_gradient(delta) / denominator;
            }
        }

        scatter_add(jac.index_axis_mut(Axis(0), g), &targets, updates.view());
    }

    jac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::dtm::DistanceToMeasure;
    use ndarray::{array, Array1};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    const STEP: f64 = 1e-6;

    type Fixture = (Arc<Grid>, Array2<f64>, Array1<f64>, Array2<f64>, Array1<f64>);

    fn setup(seed: u64, m: usize) -> Fixture {
        let grid = Arc::new(Grid::new(&[[-1.0, 1.0], [-1.0, 1.0]], &[0.5, 0.5]).unwrap());
        let mut rng = StdRng::seed_from_u64(seed);
        let points = Array2::from_shape_fn((m, 2), |_| rng.gen_range(-1.0..1.0));
        let weights = Array1::from_shape_fn(m, |_| rng.gen_range(0.2..2.0));
        let direction = Array2::from_shape_fn((m, 2), |_| rng.gen_range(-1.0..1.0));
        let weight_direction = Array1::from_shape_fn(m, |_| rng.gen_range(-1.0..1.0));
        (grid, points, weights, direction, weight_direction)
    }

    /// Σ_{j,c} J[g, j, c] * e[j, c]
    fn contract_points(jac: &Array3<f64>, e: &Array2<f64>) -> Array1<f64> {
        jac.outer_iter().map(|slice| (&slice * e).sum()).collect()
    }

    #[test]
    fn test_unweighted_taylor() {
        for metric in [Metric::Euclidean, Metric::Manhattan, Metric::Minkowski(3.0)] {
            let (grid, points, _, direction, _) = setup(3, 17);
            let dtm = DistanceToMeasure::new(grid.clone(), 0.3, metric).unwrap();

            let base = dtm.evaluate(points.view()).unwrap();
            let jac = base.jacobian(points.view(), &grid).unwrap();
            assert_eq!(jac.dim(), (grid.len(), 17, 2));

            let moved = &points + &(&direction * STEP);
            let shifted = dtm.evaluate(moved.view()).unwrap();

            let predicted = contract_points(&jac, &direction) * STEP;
            for g in 0..grid.len() {
                let actual = shifted.values[g] - base.values[g];
                assert!(
                    (actual - predicted[g]).abs() < 1e-9,
                    "{:?} grid {}: actual {} predicted {}",
                    metric,
                    g,
                    actual,
                    predicted[g]
                );
            }
        }
    }

    #[test]
    fn test_weighted_point_taylor() {
        let metrics = [
            (Metric::Euclidean, 0.25),
            (Metric::Manhattan, 0.35),
            (Metric::Minkowski(1.5), 0.35),
            (Metric::Minkowski(3.0), 0.35),
        ];
        for (metric, m0) in metrics {
            let (grid, points, weights, direction, _) = setup(5, 20);
            let dtm = DistanceToMeasure::new(grid.clone(), m0, metric).unwrap();

            let base = dtm.evaluate_weighted(points.view(), weights.view()).unwrap();
            let jac = base.point_jacobian(points.view(), &grid).unwrap();

            let moved = &points + &(&direction * STEP);
            let shifted = dtm.evaluate_weighted(moved.view(), weights.view()).unwrap();

            let predicted = contract_points(&jac, &direction) * STEP;
            for g in 0..grid.len() {
                let actual = shifted.values[g] - base.values[g];
                assert!(
                    (actual - predicted[g]).abs() < 1e-9,
                    "{:?} grid {}: actual {} predicted {}",
                    metric,
                    g,
                    actual,
                    predicted[g]
                );
            }
        }
    }

    #[test]
    fn test_weight_taylor() {
        let metrics = [
            Metric::Euclidean,
            Metric::Manhattan,
            Metric::Minkowski(1.5),
            Metric::Minkowski(3.0),
        ];
        for metric in metrics {
            let (grid, points, weights, _, weight_direction) = setup(9, 20);
            let dtm = DistanceToMeasure::new(grid.clone(), 0.3, metric).unwrap();

            let base = dtm.evaluate_weighted(points.view(), weights.view()).unwrap();
            let jac = base.weight_jacobian();
            assert_eq!(jac.dim(), (grid.len(), 20));

            let moved = &weights + &(&weight_direction * STEP);
            let shifted = dtm.evaluate_weighted(points.view(), moved.view()).unwrap();

            let predicted = jac.dot(&weight_direction) * STEP;
            for g in 0..grid.len() {
                let actual = shifted.values[g] - base.values[g];
                assert!(
                    (actual - predicted[g]).abs() < 1e-9,
                    "{:?} grid {}: actual {} predicted {}",
                    metric,
                    g,
                    actual,
                    predicted[g]
                );
            }
        }
    }

    #[test]
    fn test_uniform_weight_jacobians_agree() {
        let (grid, points, _, _, _) = setup(13, 12);
        let weights = Array1::<f64>::ones(12);
        let dtm = DistanceToMeasure::new(grid.clone(), 0.4, Metric::Euclidean).unwrap();

        let plain = dtm.evaluate(points.view()).unwrap().jacobian(points.view(), &grid).unwrap();
        let weighted = dtm
            .evaluate_weighted(points.view(), weights.view())
            .unwrap()
            .point_jacobian(points.view(), &grid)
            .unwrap();

        for (a, b) in plain.iter().zip(weighted.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_dtm_gives_finite_rows() {
        let grid = Arc::new(Grid::new(&[[0.0, 2.0]], &[1.0]).unwrap());
        let dtm = DistanceToMeasure::new(grid.clone(), 1.0, Metric::Euclidean).unwrap();
        let points = array![[1.0]];

        let result = dtm.evaluate(points.view()).unwrap();
        assert_eq!(result.values[1], 0.0);

        let jac = result.jacobian(points.view(), &grid).unwrap();
        assert!(jac.iter().all(|v| v.is_finite()));
        assert_eq!(jac[[1, 0, 0]], 0.0);
        assert_eq!(jac[[0, 0, 0]], 1.0);
        assert_eq!(jac[[2, 0, 0]], -1.0);
    }

    #[test]
    fn test_manhattan_gradient() {
        let grid = Arc::new(Grid::new(&[[0.0, 0.0]], &[1.0]).unwrap());
        let dtm = DistanceToMeasure::new(grid.clone(), 1.0, Metric::Manhattan).unwrap();
        let points = array![[1.0], [-3.0]];

        let result = dtm.evaluate(points.view()).unwrap();
        let jac = result.jacobian(points.view(), &grid).unwrap();

        // DTM = (|x0| + |x1|) / 2
        assert_eq!(jac[[0, 0, 0]], 0.5);
        assert_eq!(jac[[0, 1, 0]], -0.5);
    }
}
