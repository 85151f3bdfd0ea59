//! Pipeline: From Point Clouds to Topological Features
//!
//! `TopoLayer` chains the DTM field, cubical persistence and the
//! landscape/diagram summaries for a single sample, and composes their
//! Jacobians. `BatchPipeline` runs a layer over batches on a bounded rayon
//! pool, with a configurable policy for samples whose input is degenerate.

mod batch;
mod layer;

pub use batch::{BatchPipeline, DiagramBatch, GradientBatch, LandscapeBatch};
pub use layer::{LandscapeGradient, TopoLayer};
