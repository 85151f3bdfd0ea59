//! Single-sample topological feature layer
//!
//! Chains the stages for one sample:
//!
//!   points (+ weights) → DTM field on the grid → cubical persistence
//!                     → padded diagram | landscape (+ Jacobian)
//!
//! Gradients are composed by the chain rule. With F = n_dims · n_levels ·
//! n_ranks landscape features, the [F, N] landscape Jacobian is multiplied by
//! the [N, M·d] (or [N, M]) DTM Jacobian and reshaped back.

use std::sync::Arc;

use ndarray::{Array2, Array3, Array4, Array5, ArrayView1, ArrayView2};

use crate::config::PipelineConfig;
use crate::error::{Result, TopoError};
use crate::measure::{DistanceToMeasure, Grid, Metric, UnweightedDtm, WeightedDtm};
use crate::summaries::{Landscape, PaddedDiagram};
use crate::topology::{compute_cubical_persistence, CubicalPersistence};

/// Landscape values with their derivatives with respect to the inputs
#[derive(Debug, Clone)]
pub struct LandscapeGradient {
    /// λ values, shape [n_dims, n_levels, n_ranks]
    pub values: Array3<f64>,
    /// ∂λ/∂points, shape [n_dims, n_levels, n_ranks, M, d]
    /// (None in grid-weighted mode, where the points are the fixed grid)
    pub d_points: Option<Array5<f64>>,
    /// ∂λ/∂weights, shape [n_dims, n_levels, n_ranks, M]
    /// (None for unweighted inputs)
    pub d_weights: Option<Array4<f64>>,
}

/// DTM filtration followed by cubical persistence and its summaries
#[derive(Debug, Clone)]
pub struct TopoLayer {
    config: PipelineConfig,
    grid: Arc<Grid>,
    dtm: DistanceToMeasure,
}

impl TopoLayer {
    /// Validate the configuration and build the grid
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let grid = Arc::new(Grid::from_config(&config)?);
        let metric = Metric::from_exponent(config.r);
        let dtm = DistanceToMeasure::new(Arc::clone(&grid), config.m0, metric)?;

        log::debug!(
            "topo layer: grid {:?} ({} points), m0 = {}, r = {}",
            grid.shape(),
            grid.len(),
            config.m0,
            config.r
        );

        Ok(Self { config, grid, dtm })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Number of landscape features per sample
    pub fn n_features(&self) -> usize {
        self.config.dimensions.len() * self.config.levels.len() * self.config.ranks.len()
    }

    // Field-level stages

    /// DTM field of an unweighted point cloud, shape [M, d]
    pub fn compute_dtm(&self, points: ArrayView2<'_, f64>) -> Result<UnweightedDtm> {
        self.dtm.evaluate(points)
    }

    /// DTM field of a weighted point cloud
    pub fn compute_dtm_weighted(
        &self,
        points: ArrayView2<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<WeightedDtm> {
        self.dtm.evaluate_weighted(points, weights)
    }

    /// Persistence pairs of a field over the grid
    pub fn compute_persistence(&self, field: ArrayView1<'_, f64>) -> Result<CubicalPersistence> {
        compute_cubical_persistence(self.grid.shape(), field)
    }

    /// Padded diagram of a field over the grid
    pub fn compute_diagram(&self, field: ArrayView1<'_, f64>) -> Result<PaddedDiagram> {
        let pd = self.compute_persistence(field)?;
        Ok(PaddedDiagram::from_pairs(
            &pd.pairs,
            &self.config.dimensions,
            self.config.nmax_diag,
            self.config.max_scale,
        ))
    }

    /// Landscape of a field over the grid; its `jacobian` is ∂λ/∂field
    pub fn compute_landscape(&self, field: ArrayView1<'_, f64>) -> Result<Landscape> {
        let pd = self.compute_persistence(field)?;
        Ok(Landscape::from_pairs(
            &pd.pairs,
            &self.config.dimensions,
            &self.config.levels,
            &self.config.ranks,
        ))
    }

    // Point-cloud entry points

    pub fn diagram(&self, points: ArrayView2<'_, f64>) -> Result<PaddedDiagram> {
        let dtm = self.compute_dtm(points)?;
        self.compute_diagram(dtm.values.view())
    }

    pub fn diagram_weighted(
        &self,
        points: ArrayView2<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<PaddedDiagram> {
        let dtm = self.compute_dtm_weighted(points, weights)?;
        self.compute_diagram(dtm.values.view())
    }

    pub fn landscape(&self, points: ArrayView2<'_, f64>) -> Result<Array3<f64>> {
        let dtm = self.compute_dtm(points)?;
        Ok(self.compute_landscape(dtm.values.view())?.values)
    }

    pub fn landscape_weighted(
        &self,
        points: ArrayView2<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<Array3<f64>> {
        let dtm = self.compute_dtm_weighted(points, weights)?;
        Ok(self.compute_landscape(dtm.values.view())?.values)
    }

    /// Landscape and ∂λ/∂points for an unweighted point cloud
    pub fn landscape_with_gradient(
        &self,
        points: ArrayView2<'_, f64>,
    ) -> Result<LandscapeGradient> {
        let dtm = self.compute_dtm(points)?;
        let landscape = self.compute_landscape(dtm.values.view())?;
        let d_field = landscape.jacobian(self.grid.len())?;
        let d_dtm = dtm.jacobian(points, &self.grid)?;

        Ok(LandscapeGradient {
            values: landscape.values,
            d_points: Some(self.chain_points(d_field, d_dtm)?),
            d_weights: None,
        })
    }

    /// Landscape, ∂λ/∂points and ∂λ/∂weights for a weighted point cloud
    pub fn landscape_weighted_with_gradient(
        &self,
        points: ArrayView2<'_, f64>,
        weights: ArrayView1<'_, f64>,
    ) -> Result<LandscapeGradient> {
        let dtm = self.compute_dtm_weighted(points, weights)?;
        let landscape = self.compute_landscape(dtm.values.view())?;
        let d_field = landscape.jacobian(self.grid.len())?;
        let d_points = dtm.point_jacobian(points, &self.grid)?;
        let d_weights = dtm.weight_jacobian();

        Ok(LandscapeGradient {
            values: landscape.values,
            d_points: Some(self.chain_points(d_field.clone(), d_points)?),
            d_weights: Some(self.chain_weights(d_field, d_weights)?),
        })
    }

    // Grid-weighted ("image") entry points: one weight per grid point, the
    // grid itself is the point set

    pub fn diagram_grid_weighted(&self, weights: ArrayView1<'_, f64>) -> Result<PaddedDiagram> {
        let dtm = self.grid_weighted_dtm(weights)?;
        self.compute_diagram(dtm.values.view())
    }

    pub fn landscape_grid_weighted(&self, weights: ArrayView1<'_, f64>) -> Result<Array3<f64>> {
        let dtm = self.grid_weighted_dtm(weights)?;
        Ok(self.compute_landscape(dtm.values.view())?.values)
    }

    /// Landscape and ∂λ/∂weights, shape [n_dims, n_levels, n_ranks, N]
    pub fn landscape_grid_weighted_with_gradient(
        &self,
        weights: ArrayView1<'_, f64>,
    ) -> Result<LandscapeGradient> {
        let dtm = self.grid_weighted_dtm(weights)?;
        let landscape = self.compute_landscape(dtm.values.view())?;
        let d_field = landscape.jacobian(self.grid.len())?;

        Ok(LandscapeGradient {
            values: landscape.values,
            d_points: None,
            d_weights: Some(self.chain_weights(d_field, dtm.weight_jacobian())?),
        })
    }

    fn grid_weighted_dtm(&self, weights: ArrayView1<'_, f64>) -> Result<WeightedDtm> {
        if weights.len() != self.grid.len() {
            return Err(TopoError::dimension_mismatch(
                "weights vs grid",
                self.grid.len(),
                weights.len(),
            ));
        }
        self.compute_dtm_weighted(self.grid.points(), weights)
    }

    /// [D, T, K, N] · [N, M, d] → [D, T, K, M, d]
    fn chain_points(&self, d_field: Array4<f64>, d_dtm: Array3<f64>) -> Result<Array5<f64>> {
        let (n_dims, n_levels, n_ranks, n_cells) = d_field.dim();
        let (_, m, d) = d_dtm.dim();

        let lhs = d_field.into_shape((n_dims * n_levels * n_ranks, n_cells))?;
        let rhs = d_dtm.into_shape((n_cells, m * d))?;
        Ok(lhs.dot(&rhs).into_shape((n_dims, n_levels, n_ranks, m, d))?)
    }

    /// [D, T, K, N] · [N, M] → [D, T, K, M]
    fn chain_weights(&self, d_field: Array4<f64>, d_dtm: Array2<f64>) -> Result<Array4<f64>> {
        let (n_dims, n_levels, n_ranks, n_cells) = d_field.dim();
        let m = d_dtm.ncols();

        let lhs = d_field.into_shape((n_dims * n_levels * n_ranks, n_cells))?;
        Ok(lhs.dot(&d_dtm).into_shape((n_dims, n_levels, n_ranks, m))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{s, Array1};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal, Uniform};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            m0: 0.2,
            lims: vec![[-1.5, 1.5], [-1.5, 1.5]],
            by: vec![0.25],
            r: 2.0,
            dimensions: vec![0, 1],
            levels: vec![0.2, 0.4, 0.6],
            ranks: vec![0, 1],
            nmax_diag: 32,
            max_scale: 2.0,
            ..Default::default()
        }
    }

    fn noisy_circle(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let angle = Uniform::new(0.0, std::f64::consts::TAU);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let mut points = Array2::<f64>::zeros((n, 2));
        for mut row in points.rows_mut() {
            let theta = angle.sample(&mut rng);
            row[0] = theta.cos() + noise.sample(&mut rng);
            row[1] = theta.sin() + noise.sample(&mut rng);
        }
        points
    }

    #[test]
    fn test_circle_has_a_loop() {
        let layer = TopoLayer::new(small_config()).unwrap();
        let points = noisy_circle(60, 1);

        let diagram = layer.diagram(points.view()).unwrap();
        assert!(diagram.pair_counts[1] >= 1);
        let top_h1 = diagram.values.slice(s![1, 0, ..]).to_vec();
        assert!(top_h1[1] - top_h1[0] > 0.3);

        let land = layer.landscape(points.view()).unwrap();
        assert_eq!(land.dim(), (2, 3, 2));
        assert!(land.iter().all(|v| *v >= 0.0));
        assert!(land[[1, 2, 0]] > 0.0);
    }

    #[test]
    fn test_uniform_weights_match_unweighted() {
        let layer = TopoLayer::new(small_config()).unwrap();
        let points = noisy_circle(40, 2);
        let weights = Array1::from_elem(40, 1.0);

        let plain = layer.landscape(points.view()).unwrap();
        let weighted = layer.landscape_weighted(points.view(), weights.view()).unwrap();
        for (a, b) in plain.iter().zip(weighted.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_point_gradient_matches_finite_differences() {
        let layer = TopoLayer::new(small_config()).unwrap();
        let points = noisy_circle(30, 3);
        let grad = layer.landscape_with_gradient(points.view()).unwrap();
        let d_points = grad.d_points.unwrap();
        assert_eq!(d_points.dim(), (2, 3, 2, 30, 2));
        assert!(grad.d_weights.is_none());

        let mut rng = StdRng::seed_from_u64(30);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let step = 1e-7;
        let direction = Array2::from_shape_fn((30, 2), |_| step * noise.sample(&mut rng));
        let moved = &points + &direction;

        let observed = layer.landscape(moved.view()).unwrap() - &grad.values;
        let flat = d_points.into_shape((12, 60)).unwrap();
        let predicted = flat.dot(&direction.into_shape(60).unwrap());

        for (p, o) in predicted.iter().zip(observed.iter()) {
            assert_relative_eq!(*p, *o, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_grid_weighted_gradient_matches_finite_differences() {
        let config = PipelineConfig {
            lims: vec![[0.0, 1.0], [0.0, 1.0]],
            by: vec![0.125],
            levels: vec![0.05, 0.1, 0.15],
            ..small_config()
        };
        let layer = TopoLayer::new(config).unwrap();
        let n = layer.grid().len();

        // A ring image; the jitter keeps field values distinct
        let mut rng = StdRng::seed_from_u64(5);
        let jitter = Uniform::new(0.0, 0.05);
        let grid = layer.grid().points().to_owned();
        let image: Array1<f64> = grid
            .rows()
            .into_iter()
            .map(|p| {
                let radius = ((p[0] - 0.5).powi(2) + (p[1] - 0.5).powi(2)).sqrt();
                0.1 + jitter.sample(&mut rng) + (-(radius - 0.3).powi(2) / 0.005).exp()
            })
            .collect();

        let grad = layer.landscape_grid_weighted_with_gradient(image.view()).unwrap();
        assert!(grad.d_points.is_none());
        let d_weights = grad.d_weights.unwrap();
        assert_eq!(d_weights.dim(), (2, 3, 2, n));

        let noise = Normal::new(0.0, 1.0).unwrap();
        let step = 1e-7;
        let direction = Array1::from_shape_fn(n, |_| step * noise.sample(&mut rng));
        let moved = &image + &direction;

        let observed = layer.landscape_grid_weighted(moved.view()).unwrap() - &grad.values;
        let predicted = d_weights.into_shape((12, n)).unwrap().dot(&direction);
        for (p, o) in predicted.iter().zip(observed.iter()) {
            assert_relative_eq!(*p, *o, epsilon = 1e-9);
        }

        let diagram = layer.diagram_grid_weighted(image.view()).unwrap();
        assert!(diagram.pair_counts[0] >= 1);
    }

    #[test]
    fn test_shape_errors() {
        let layer = TopoLayer::new(small_config()).unwrap();
        let points_3d = Array2::<f64>::zeros((10, 3));
        assert!(matches!(
            layer.diagram(points_3d.view()),
            Err(TopoError::DimensionMismatch { .. })
        ));

        let short = Array1::<f64>::ones(5);
        assert!(matches!(
            layer.landscape_grid_weighted(short.view()),
            Err(TopoError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            dimensions: vec![2],
            ..small_config()
        };
        assert!(matches!(
            TopoLayer::new(config),
            Err(TopoError::InvalidParameter { .. })
        ));
    }
}
