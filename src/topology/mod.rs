//! Topology Module: Cubical Persistent Homology
//!
//! Implements the topological side of the feature extractor:
//! - Filtered cubical complexes built from a scalar field on a grid
//! - Persistence pairs via boundary matrix reduction with clearing
//! - Critical cells linking every birth/death value to a grid point
//!
//! ## Mathematical Background
//!
//! For a scalar field f on a grid we take the sublevel filtration
//! K_t = { σ : f(σ) ≤ t } of the cubical complex whose top cells carry the
//! field values. Persistent homology tracks the birth and death of connected
//! components, loops and voids across t. Because every filtration value is a
//! field value, each birth and death is a piecewise-linear function of the
//! field with unit derivative at a single critical cell.

mod cubical;
mod persistence;

pub use cubical::CubicalComplex;
pub use persistence::{compute_cubical_persistence, CubicalPersistence, PersistencePair};
