//! Batched evaluation over a bounded worker pool
//!
//! Samples are processed in consecutive chunks of `batch_size` (the last
//! chunk may be smaller). Within a chunk samples run in parallel on the
//! pipeline's own rayon pool; results always come back in input order, and
//! the output does not depend on `batch_size` or the number of threads.

use ndarray::{Array3, Array4, Array5, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::layer::{LandscapeGradient, TopoLayer};
use crate::config::{DegeneratePolicy, PipelineConfig};
use crate::error::{Result, TopoError};
use crate::summaries::PaddedDiagram;

/// Padded diagrams of a batch, shape [B, n_dims, nmax_diag, 2]
#[derive(Debug, Clone)]
pub struct DiagramBatch {
    pub values: Array4<f64>,
    /// Largest per-dimension pair count before truncation
    pub max_pair_count: usize,
    /// Samples replaced by zeros under `DegeneratePolicy::Placeholder`
    pub failed: Vec<usize>,
}

impl DiagramBatch {
    /// True if some diagram was truncated
    pub fn overflowed(&self) -> bool {
        self.max_pair_count > self.values.len_of(Axis(2))
    }
}

/// Landscapes of a batch, shape [B, n_dims, n_levels, n_ranks]
#[derive(Debug, Clone)]
pub struct LandscapeBatch {
    pub values: Array4<f64>,
    pub failed: Vec<usize>,
}

/// Landscapes with per-sample gradients
#[derive(Debug, Clone)]
pub struct GradientBatch {
    pub samples: Vec<LandscapeGradient>,
    pub failed: Vec<usize>,
    /// Per-sample landscape shape (n_dims, n_levels, n_ranks)
    shape: (usize, usize, usize),
}

impl GradientBatch {
    /// Landscape values stacked to [B, n_dims, n_levels, n_ranks]
    pub fn values(&self) -> Result<Array4<f64>> {
        if self.samples.is_empty() {
            let (n_dims, n_levels, n_ranks) = self.shape;
            return Ok(Array4::zeros((0, n_dims, n_levels, n_ranks)));
        }
        let views: Vec<_> = self.samples.iter().map(|s| s.values.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}

/// Runs a `TopoLayer` over batches of samples
pub struct BatchPipeline {
    layer: TopoLayer,
    pool: ThreadPool,
}

impl BatchPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let layer = TopoLayer::new(config)?;

        let mut builder = ThreadPoolBuilder::new();
        if let Some(threads) = layer.config().num_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        log::info!(
            "batch pipeline: {} threads, batch size {}",
            pool.current_num_threads(),
            layer.config().batch_size
        );

        Ok(Self { layer, pool })
    }

    pub fn layer(&self) -> &TopoLayer {
        &self.layer
    }

    // Diagrams

    /// Diagrams of unweighted point clouds, points shape [B, M, d]
    pub fn diagrams(&self, points: ArrayView3<'_, f64>) -> Result<DiagramBatch> {
        let samples = self.run(points.len_of(Axis(0)), |i| {
            self.layer.diagram(points.index_axis(Axis(0), i))
        })?;
        Ok(self.collect_diagrams(samples))
    }

    /// Diagrams of weighted point clouds, weights shape [B, M]
    pub fn diagrams_weighted(
        &self,
        points: ArrayView3<'_, f64>,
        weights: ArrayView2<'_, f64>,
    ) -> Result<DiagramBatch> {
        check_batch(points.len_of(Axis(0)), weights)?;
        let samples = self.run(points.len_of(Axis(0)), |i| {
            self.layer
                .diagram_weighted(points.index_axis(Axis(0), i), weights.row(i))
        })?;
        Ok(self.collect_diagrams(samples))
    }

    /// Diagrams of grid-weighted samples, weights shape [B, N]
    pub fn diagrams_grid_weighted(&self, weights: ArrayView2<'_, f64>) -> Result<DiagramBatch> {
        let samples = self.run(weights.nrows(), |i| {
            self.layer.diagram_grid_weighted(weights.row(i))
        })?;
        Ok(self.collect_diagrams(samples))
    }

    // Landscapes

    pub fn landscapes(&self, points: ArrayView3<'_, f64>) -> Result<LandscapeBatch> {
        let samples = self.run(points.len_of(Axis(0)), |i| {
            self.layer.landscape(points.index_axis(Axis(0), i))
        })?;
        self.collect_landscapes(samples)
    }

    pub fn landscapes_weighted(
        &self,
        points: ArrayView3<'_, f64>,
        weights: ArrayView2<'_, f64>,
    ) -> Result<LandscapeBatch> {
        check_batch(points.len_of(Axis(0)), weights)?;
        let samples = self.run(points.len_of(Axis(0)), |i| {
            self.layer
                .landscape_weighted(points.index_axis(Axis(0), i), weights.row(i))
        })?;
        self.collect_landscapes(samples)
    }

    pub fn landscapes_grid_weighted(&self, weights: ArrayView2<'_, f64>) -> Result<LandscapeBatch> {
        let samples = self.run(weights.nrows(), |i| {
            self.layer.landscape_grid_weighted(weights.row(i))
        })?;
        self.collect_landscapes(samples)
    }

    // Landscapes with gradients

    pub fn landscapes_with_gradient(&self, points: ArrayView3<'_, f64>) -> Result<GradientBatch> {
        let (_, m, d) = points.dim();
        let samples = self.run(points.len_of(Axis(0)), |i| {
            self.layer.landscape_with_gradient(points.index_axis(Axis(0), i))
        })?;
        Ok(self.collect_gradients(samples, Some((m, d)), None))
    }

    pub fn landscapes_weighted_with_gradient(
        &self,
        points: ArrayView3<'_, f64>,
        weights: ArrayView2<'_, f64>,
    ) -> Result<GradientBatch> {
        let (_, m, d) = points.dim();
        check_batch(points.len_of(Axis(0)), weights)?;
        let samples = self.run(points.len_of(Axis(0)), |i| {
            self.layer
                .landscape_weighted_with_gradient(points.index_axis(Axis(0), i), weights.row(i))
        })?;
        Ok(self.collect_gradients(samples, Some((m, d)), Some(m)))
    }

    pub fn landscapes_grid_weighted_with_gradient(
        &self,
        weights: ArrayView2<'_, f64>,
    ) -> Result<GradientBatch> {
        let samples = self.run(weights.nrows(), |i| {
            self.layer.landscape_grid_weighted_with_gradient(weights.row(i))
        })?;
        Ok(self.collect_gradients(samples, None, Some(self.layer.grid().len())))
    }

    /// Evaluate `f` for every sample index, chunk by chunk, applying the
    /// degenerate-sample policy. Failed samples come back as None.
    fn run<T, F>(&self, n_samples: usize, f: F) -> Result<Samples<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let batch_size = self.layer.config().batch_size;
        let policy = self.layer.config().degenerate_policy;

        let mut samples = Samples {
            outputs: Vec::with_capacity(n_samples),
            failed: Vec::new(),
        };

        for start in (0..n_samples).step_by(batch_size) {
            let end = (start + batch_size).min(n_samples);
            let chunk: Vec<Result<T>> = self
                .pool
                .install(|| (start..end).into_par_iter().map(&f).collect());

            for (offset, result) in chunk.into_iter().enumerate() {
                let index = start + offset;
                match result {
                    Ok(output) => samples.outputs.push(Some(output)),
                    Err(err)
                        if policy == DegeneratePolicy::Placeholder
                            && err.is_degenerate_input() =>
                    {
                        log::warn!("sample {} replaced by placeholder: {}", index, err);
                        samples.failed.push(index);
                        samples.outputs.push(None);
                    }
                    Err(err) => return Err(err.in_sample(index)),
                }
            }

            log::debug!("processed samples {}..{} of {}", start, end, n_samples);
        }

        Ok(samples)
    }

    fn collect_diagrams(&self, samples: Samples<PaddedDiagram>) -> DiagramBatch {
        let config = self.layer.config();
        let n_dims = config.dimensions.len();
        let capacity = config.nmax_diag;

        let mut values = Array4::<f64>::zeros((samples.outputs.len(), n_dims, capacity, 2));
        let mut max_pair_count = 0;
        for (i, diagram) in samples.outputs.iter().enumerate() {
            if let Some(diagram) = diagram {
                values.index_axis_mut(Axis(0), i).assign(&diagram.values);
                max_pair_count = max_pair_count.max(diagram.max_pair_count());
            }
        }

        if config.report_capacity {
            if max_pair_count > capacity {
                log::warn!(
                    "largest diagram has {} pairs, exceeding capacity {}; \
                     extra pairs were dropped",
                    max_pair_count,
                    capacity
                );
            } else {
                log::info!("largest diagram has {} pairs (capacity {})", max_pair_count, capacity);
            }
        }

        DiagramBatch {
            values,
            max_pair_count,
            failed: samples.failed,
        }
    }

    fn collect_landscapes(&self, samples: Samples<Array3<f64>>) -> Result<LandscapeBatch> {
        let config = self.layer.config();
        let shape = (config.dimensions.len(), config.levels.len(), config.ranks.len());
        let zeros = Array3::<f64>::zeros(shape);

        let views: Vec<_> = samples
            .outputs
            .iter()
            .map(|s| s.as_ref().unwrap_or(&zeros).view())
            .collect();
        let values = if views.is_empty() {
            Array4::zeros((0, shape.0, shape.1, shape.2))
        } else {
            ndarray::stack(Axis(0), &views)?
        };

        Ok(LandscapeBatch {
            values,
            failed: samples.failed,
        })
    }

    fn collect_gradients(
        &self,
        samples: Samples<LandscapeGradient>,
        point_shape: Option<(usize, usize)>,
        n_weights: Option<usize>,
    ) -> GradientBatch {
        let config = self.layer.config();
        let (n_dims, n_levels, n_ranks) =
            (config.dimensions.len(), config.levels.len(), config.ranks.len());

        let samples_out = samples
            .outputs
            .into_iter()
            .map(|s| {
                s.unwrap_or_else(|| LandscapeGradient {
                    values: Array3::zeros((n_dims, n_levels, n_ranks)),
                    d_points: point_shape
                        .map(|(m, d)| Array5::zeros((n_dims, n_levels, n_ranks, m, d))),
                    d_weights: n_weights.map(|m| Array4::zeros((n_dims, n_levels, n_ranks, m))),
                })
            })
            .collect();

        GradientBatch {
            samples: samples_out,
            failed: samples.failed,
            shape: (n_dims, n_levels, n_ranks),
        }
    }
}

/// Per-sample outputs in input order, None for placeholders
struct Samples<T> {
    outputs: Vec<Option<T>>,
    failed: Vec<usize>,
}

fn check_batch(n_samples: usize, weights: ArrayView2<'_, f64>) -> Result<()> {
    if weights.nrows() != n_samples {
        return Err(TopoError::dimension_mismatch(
            "weight rows vs samples",
            n_samples,
            weights.nrows(),
        ));
    }
    Ok(())
}
