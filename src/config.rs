//! Pipeline Configuration
//!
//! All parameters are fixed when a pipeline is built and shared read-only
//! by every sample it processes. `validate` is called by the pipeline
//! constructors so that configuration mistakes fail before any data is seen.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopoError};

/// What a batch call does when one sample has degenerate input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Fail the whole call, naming the first failing sample
    #[default]
    Fail,
    /// Emit zeros for the failing sample and report its index
    Placeholder,
}

/// Configuration of the DTM → persistence → landscape pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Mass threshold as a fraction of the total weight, in (0, 1]
    pub m0: f64,
    /// Grid bounds `[min, max]` per axis
    pub lims: Vec<[f64; 2]>,
    /// Grid step: one value for every axis, or one per axis
    pub by: Vec<f64>,
    /// Exponent of the Lr metric and of the DTM power mean
    pub r: f64,
    /// Homology dimensions to report
    pub dimensions: Vec<usize>,
    /// Ascending landscape levels t
    pub levels: Vec<f64>,
    /// Landscape ranks (0 = largest)
    pub ranks: Vec<usize>,
    /// Diagram capacity per homology dimension
    pub nmax_diag: usize,
    /// Finite value substituted for infinite deaths in diagrams
    pub max_scale: f64,
    /// Samples per chunk in batch calls
    pub batch_size: usize,
    /// Worker threads for batch calls (None = rayon default)
    pub num_threads: Option<usize>,
    /// Handling of samples with degenerate input
    pub degenerate_policy: DegeneratePolicy,
    /// Log the largest diagram size seen by each batch call
    pub report_capacity: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            m0: 0.3,
            lims: vec![[-1.0, 1.0], [-1.0, 1.0]],
            by: vec![0.1],
            r: 2.0,
            dimensions: vec![0, 1],
            levels: vec![0.5, 0.7, 0.9],
            ranks: vec![0, 1],
            nmax_diag: 100,
            max_scale: 1.0,
            batch_size: 16,
            num_threads: None,
            degenerate_policy: DegeneratePolicy::default(),
            report_capacity: false,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Spatial dimension of the grid
    pub fn grid_dimension(&self) -> usize {
        self.lims.len()
    }

    /// Step size along each axis, with a single step broadcast
    pub fn steps(&self) -> Vec<f64> {
        if self.by.len() == 1 {
            vec![self.by[0]; self.lims.len()]
        } else {
            self.by.clone()
        }
    }

    /// Check every parameter, failing on the first invalid one
    pub fn validate(&self) -> Result<()> {
        if !(self.m0 > 0.0 && self.m0 <= 1.0) {
            return Err(TopoError::invalid_parameter(
                "m0",
                format!("must lie in (0, 1], got {}", self.m0),
            ));
        }
        if !self.r.is_finite() || self.r < 1.0 {
            return Err(TopoError::invalid_parameter(
                "r",
                format!("must be a finite exponent >= 1, got {}", self.r),
            ));
        }
        if self.lims.is_empty() {
            return Err(TopoError::invalid_parameter("lims", "at least one axis is required"));
        }
        for (axis, &[lo, hi]) in self.lims.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(TopoError::invalid_parameter(
                    "lims",
                    format!("axis {} has invalid bounds [{}, {}]", axis, lo, hi),
                ));
            }
        }
        if self.by.len() != 1 && self.by.len() != self.lims.len() {
            return Err(TopoError::invalid_parameter(
                "by",
                format!(
                    "expected 1 or {} step sizes, got {}",
                    self.lims.len(),
                    self.by.len()
                ),
            ));
        }
        if self.by.iter().any(|&b| !(b > 0.0 && b.is_finite())) {
            return Err(TopoError::invalid_parameter("by", "step sizes must be positive"));
        }
        if self.dimensions.is_empty() {
            return Err(TopoError::invalid_parameter(
                "dimensions",
                "no homology dimension requested",
            ));
        }
        if let Some(&d) = self.dimensions.iter().find(|&&d| d >= self.grid_dimension()) {
            return Err(TopoError::invalid_parameter(
                "dimensions",
                format!(
                    "homology dimension {} does not exist on a {}-dimensional grid",
                    d,
                    self.grid_dimension()
                ),
            ));
        }
        if self.levels.is_empty() {
            return Err(TopoError::invalid_parameter("levels", "level sequence is empty"));
        }
        if self.levels.iter().any(|t| !t.is_finite()) {
            return Err(TopoError::invalid_parameter("levels", "levels must be finite"));
        }
        if self.levels.windows(2).any(|w| w[0] > w[1]) {
            return Err(TopoError::invalid_parameter("levels", "levels must be ascending"));
        }
        if self.ranks.is_empty() {
            return Err(TopoError::invalid_parameter("ranks", "rank set is empty"));
        }
        if self.nmax_diag == 0 {
            return Err(TopoError::invalid_parameter("nmax_diag", "capacity must be positive"));
        }
        if !self.max_scale.is_finite() {
            return Err(TopoError::invalid_parameter("max_scale", "must be finite"));
        }
        if self.batch_size == 0 {
            return Err(TopoError::invalid_parameter("batch_size", "must be positive"));
        }
        if self.num_threads == Some(0) {
            return Err(TopoError::invalid_parameter("num_threads", "must be positive"));
        }
        Ok(())
    }
}
