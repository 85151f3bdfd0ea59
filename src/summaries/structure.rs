//! Structure-element vectorization of padded diagrams
//!
//! Each element is a Gaussian bump centred at (mu0, mu1) with inverse widths
//! (sigma0, sigma1). A diagram point (x0, x1) contributes
//!
//! ```text
//! exp(-sigma0² (x0 - mu0)² - sigma1² (x1 - mu1)²)          x1 > nu
//! exp(-sigma0² (x0 - mu0)² - sigma1² (ln(x1/nu)·nu + nu - mu1)²)   0 < x1 <= nu
//! 0                                                        x1 <= 0
//! ```
//!
//! so points close to the diagonal are pulled together by a logarithm below
//! `nu`, and the zero padding rows of a `PaddedDiagram` contribute nothing.
//! Element parameters are supplied by the caller; fitting them is left to
//! whatever model consumes the features.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::PaddedDiagram;
use crate::error::{Result, TopoError};

/// One Gaussian structure element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureElement {
    pub mu0: f64,
    pub mu1: f64,
    pub sigma0: f64,
    pub sigma1: f64,
}

impl StructureElement {
    pub fn new(mu0: f64, mu1: f64, sigma0: f64, sigma1: f64) -> Self {
        Self {
            mu0,
            mu1,
            sigma0,
            sigma1,
        }
    }

    /// Contribution of a single diagram point
    pub fn response(&self, x0: f64, x1: f64, nu: f64) -> f64 {
        if x1 <= 0.0 {
            return 0.0;
        }
        let y1 = if x1 > nu { x1 } else { (x1 / nu).ln() * nu + nu };
        let a = self.sigma0 * (x0 - self.mu0);
        let b = self.sigma1 * (y1 - self.mu1);
        (-a * a - b * b).exp()
    }
}

impl PaddedDiagram {
    /// Sum of each element's response over the pairs of each dimension.
    ///
    /// Returns shape [n_dims, n_elements]. `nu` must be positive and finite.
    pub fn structure_features(
        &self,
        elements: &[StructureElement],
        nu: f64,
    ) -> Result<Array2<f64>> {
        if !(nu > 0.0 && nu.is_finite()) {
            return Err(TopoError::invalid_parameter("nu", "must be positive and finite"));
        }
        if elements
            .iter()
            .any(|e| ![e.mu0, e.mu1, e.sigma0, e.sigma1].iter().all(|v| v.is_finite()))
        {
            return Err(TopoError::non_finite("structure element parameters"));
        }

        let n_dims = self.values.len_of(Axis(0));
        let mut features = Array2::<f64>::zeros((n_dims, elements.len()));
        for (dim, rows) in self.values.axis_iter(Axis(0)).enumerate() {
            for row in rows.axis_iter(Axis(0)) {
                for (unit, element) in elements.iter().enumerate() {
                    features[[dim, unit]] += element.response(row[0], row[1], nu);
                }
            }
        }
        Ok(features)
    }
}
