//! Measure Module: Distance-to-Measure Fields on a Grid
//!
//! Turns a (weighted) point cloud into a scalar field over a fixed lattice:
//! - Regular grid construction
//! - Brute-force k-nearest-neighbour search under an Lr metric
//! - Distance to measure (DTM), unweighted and weighted
//! - Exact Jacobians of the DTM with respect to points and weights
//!
//! ## Mathematical Background
//!
//! For a probability measure μ and mass m0, the distance to measure
//! d_{μ,m0}(y) averages the distance from y to μ over the m0 fraction of mass
//! nearest to y. For an empirical measure it reduces to a power mean over
//! nearest neighbours, with the neighbour that straddles the mass budget
//! counted fractionally. Its sublevel sets are a robust replacement for the
//! union of balls around the sample.

mod dtm;
mod grid;
mod jacobian;
mod knn;

pub use dtm::{DistanceToMeasure, UnweightedDtm, WeightedDtm, DTM_FLOOR};
pub use grid::Grid;
pub use knn::{knn, knn_batch, KnnResult, Metric};
