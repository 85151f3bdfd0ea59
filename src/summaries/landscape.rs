//! Persistence Landscapes at Fixed Levels
//!
//! For a diagram {(bᵢ, dᵢ)} of one homology dimension, the k-th landscape
//! function is
//!
//!   λₖ(t) = k-th largest of { Λᵢ(t) },   Λᵢ(t) = max(min(t - bᵢ, dᵢ - t), 0)
//!
//! evaluated here at a fixed, ascending list of levels t and ranks k.
//! Essential classes take part with dᵢ = +∞, so their tent is the ray t - bᵢ.
//!
//! ## Gradient
//!
//! Each value is the tent of one selected pair, so it depends on at most one
//! birth and one death value, both of which are field values at critical
//! cells:
//!
//!   ∂λ/∂f[birth_cell] = -1   if t > b and 2t < b + d
//!   ∂λ/∂f[death_cell] = +1   if t < d and 2t > b + d
//!
//! Ties in the descending sort are broken by enumeration order of the pairs.
//!
//! ## Reference
//!
//! Bubenik (2015). "Statistical Topological Data Analysis using Persistence
//! Landscapes". Journal of Machine Learning Research 16.

use ndarray::{Array2, Array3, Array4, Axis};

use crate::error::Result;
use crate::scatter::scatter_add;
use crate::topology::PersistencePair;

/// Landscape values together with the pairs that produced them
#[derive(Debug, Clone)]
pub struct Landscape {
    /// λ values, shape [n_dims, n_levels, n_ranks]
    pub values: Array3<f64>,
    /// Selected pair per value (None when fewer pairs than the rank)
    selected: Vec<Option<PersistencePair>>,
    levels: Vec<f64>,
}

impl Landscape {
    /// Evaluate the landscapes of the given homology dimensions
    ///
    /// # Arguments
    /// * `pairs` - Persistence pairs in enumeration order
    /// * `dimensions` - Homology dimensions, one output slab each
    /// * `levels` - Levels t at which λ is evaluated
    /// * `ranks` - Landscape ranks, 0 being the largest tent
    pub fn from_pairs(
        pairs: &[PersistencePair],
        dimensions: &[usize],
        levels: &[f64],
        ranks: &[usize],
    ) -> Self {
        let shape = (dimensions.len(), levels.len(), ranks.len());
        let mut values = Array3::<f64>::zeros(shape);
        let mut selected = Vec::with_capacity(shape.0 * shape.1 * shape.2);

        for (i, &dim) in dimensions.iter().enumerate() {
            let dim_pairs: Vec<&PersistencePair> =
                pairs.iter().filter(|p| p.dimension == dim).collect();

            for (j, &t) in levels.iter().enumerate() {
                let mut tents: Vec<(f64, &PersistencePair)> = dim_pairs
                    .iter()
                    .map(|&p| (tent_function(t, p.birth, p.death), p))
                    .collect();
                // sort_by is stable, so equal tents keep enumeration order
                tents.sort_by(|a, b| b.0.total_cmp(&a.0));

                for (k, &rank) in ranks.iter().enumerate() {
                    match tents.get(rank) {
                        Some(&(value, pair)) => {
                            values[[i, j, k]] = value;
                            selected.push(Some(*pair));
                        }
                        None => selected.push(None),
                    }
                }
            }
        }

        Self {
            values,
            selected,
            levels: levels.to_vec(),
        }
    }

    /// ∂λ/∂field, shape [n_dims, n_levels, n_ranks, n_cells]
    pub fn jacobian(&self, n_cells: usize) -> Result<Array4<f64>> {
        let (n_dims, n_levels, n_ranks) = self.values.dim();
        let n_features = n_dims * n_levels * n_ranks;

        let mut cells = Vec::new();
        let mut entries = Vec::new();

        for (feature, pair) in self.selected.iter().enumerate() {
            let Some(pair) = pair else { continue };
            let t = self.levels[(feature / n_ranks) % n_levels];
            let (b, d) = (pair.birth, pair.death);

            if t > b && 2.0 * t < b + d {
                cells.push(pair.birth_cell);
                entries.push((feature, -1.0));
            }
            if let Some(death_cell) = pair.death_cell {
                if t < d && 2.0 * t > b + d {
                    cells.push(death_cell);
                    entries.push((feature, 1.0));
                }
            }
        }

        let mut updates = Array2::<f64>::zeros((cells.len(), n_features));
        for (row, &(feature, sign)) in entries.iter().enumerate() {
            updates[[row, feature]] = sign;
        }

        let mut jacobian = Array4::<f64>::zeros((n_dims, n_levels, n_ranks, n_cells));
        {
            let flat = jacobian.view_mut().into_shape((n_features, n_cells))?;
            scatter_add(flat.reversed_axes(), &cells, updates.view());
        }

        log::trace!(
            "landscape jacobian: {} non-zero entries over {} features",
            cells.len(),
            n_features
        );

        Ok(jacobian)
    }

    /// Largest value per homology dimension
    pub fn sup_norms(&self) -> Vec<f64> {
        self.values
            .axis_iter(Axis(0))
            .map(|slab| slab.iter().cloned().fold(0.0, f64::max))
            .collect()
    }
}

/// Tent function for a persistence pair
fn tent_function(t: f64, birth: f64, death: f64) -> f64 {
    (t - birth).min(death - t).max(0.0)
}
