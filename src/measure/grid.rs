//! Regular Evaluation Grid
//!
//! The DTM is evaluated on a fixed lattice spanning per-axis bounds with a
//! fixed step. Axis `i` holds the values `min_i + j * by_i` for
//! `j = 0, ..., n_i - 1` with `n_i = ceil((max_i - min_i) / by_i) + 1`, so the
//! last value reaches `max_i` (or overshoots it by less than one step when
//! the range is not a multiple of the step).
//!
//! ## Ordering
//!
//! Grid points are enumerated with the first axis varying fastest:
//!
//!   index = j_0 + n_0 * (j_1 + n_1 * (j_2 + ...))
//!
//! This is the same ordering the cubical complex uses for its top-dimensional
//! cells, so a grid index doubles as a cell index.

use ndarray::{Array2, ArrayView2};

use crate::config::PipelineConfig;
use crate::error::{Result, TopoError};

/// Slack when counting how many steps fit in a range
const STEP_TOLERANCE: f64 = 1e-9;

/// Immutable lattice of evaluation points
#[derive(Debug, Clone)]
pub struct Grid {
    /// Point coordinates, shape [N, d]
    points: Array2<f64>,
    /// Number of points along each axis
    shape: Vec<usize>,
}

impl Grid {
    /// Build a grid from per-axis bounds and per-axis steps
    pub fn new(lims: &[[f64; 2]], by: &[f64]) -> Result<Self> {
        if lims.is_empty() {
            return Err(TopoError::empty_input("grid bounds"));
        }
        if by.len() != lims.len() {
            return Err(TopoError::dimension_mismatch("grid steps vs bounds", lims.len(), by.len()));
        }

        let mut axes: Vec<Vec<f64>> = Vec::with_capacity(lims.len());
        for (&[lo, hi], &step) in lims.iter().zip(by) {
            if !(step > 0.0) || lo > hi {
                return Err(TopoError::invalid_parameter(
                    "lims/by",
                    format!("cannot lay out [{}, {}] with step {}", lo, hi, step),
                ));
            }
            let n_steps = ((hi - lo) / step - STEP_TOLERANCE).ceil().max(0.0) as usize;
            axes.push((0..=n_steps).map(|j| lo + j as f64 * step).collect());
        }

        let shape: Vec<usize> = axes.iter().map(Vec::len).collect();
        let n: usize = shape.iter().product();
        let dim = shape.len();

        let mut points = Array2::<f64>::zeros((n, dim));
        for (idx, mut row) in points.rows_mut().into_iter().enumerate() {
            let mut rest = idx;
            for (axis, values) in axes.iter().enumerate() {
                row[axis] = values[rest % values.len()];
                rest /= values.len();
            }
        }

        Ok(Self { points, shape })
    }

    /// Build the grid described by a pipeline configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(&config.lims, &config.steps())
    }

    /// Point coordinates, shape [N, d]
    pub fn points(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    /// Number of points along each axis
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of grid points N
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Spatial dimension d
    pub fn dimension(&self) -> usize {
        self.shape.len()
    }
}
