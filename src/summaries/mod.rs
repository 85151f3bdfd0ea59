//! Summaries: Fixed-Size Representations of Persistence
//!
//! Turns variable-length sets of persistence pairs into dense tensors:
//! - Persistence landscapes at fixed levels and ranks, with their Jacobian
//!   with respect to the underlying field
//! - Zero-padded persistence diagrams of fixed capacity
//! - Gaussian structure-element sums over a padded diagram

mod diagram;
mod landscape;
mod structure;

pub use diagram::PaddedDiagram;
pub use landscape::Landscape;
pub use structure::StructureElement;
