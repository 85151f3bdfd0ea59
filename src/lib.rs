//! # DTM-Landscape
//!
//! Differentiable Topological Features of Point Clouds via the
//! Distance to Measure and Cubical Persistence Landscapes
//!
//! ## Theoretical Framework
//!
//! A (possibly weighted) point cloud is turned into a scalar field on a fixed
//! grid by the distance to measure (DTM), a robust version of the distance
//! function whose sublevel sets ignore isolated outliers. The sublevel
//! filtration of that field is a cubical complex; its persistent homology is
//! summarized by persistence landscapes evaluated at fixed levels and ranks,
//! producing a fixed-length feature vector.
//!
//! ### Differentiability
//!
//! Every stage is piecewise smooth:
//!
//! 1. **DTM**: a power mean over nearest neighbours, with an analytic
//!    Jacobian with respect to point coordinates and weights
//!
//! 2. **Persistence**: each birth/death value is the field value at one
//!    critical grid cell, so its derivative is an indicator
//!
//! 3. **Landscape**: each value is one tent function, linear in the birth or
//!    death of the selected pair
//!
//! The chain rule composes them into ∂features/∂points and ∂features/∂weights,
//! which a downstream trainable model consumes alongside the features.
//!
//! ## References
//!
//! - Chazal, Cohen-Steiner, Mérigot, "Geometric Inference for Probability
//!   Measures" (2011) - Distance to measure
//! - Bubenik, "Statistical Topological Data Analysis using Persistence
//!   Landscapes" (2015)
//! - Kim, Kim, Zaheer, Kim, Chazal, Wasserman, "PLLay: Efficient Topological
//!   Layer based on Persistence Landscapes" (2020)

pub mod config;
pub mod error;
pub mod measure;
pub mod pipeline;
pub mod scatter;
pub mod summaries;
pub mod topology;

pub use config::{DegeneratePolicy, PipelineConfig};
pub use error::{Result, TopoError};

// Re-exports from measure
pub use measure::{
    knn,
    knn_batch,
    DistanceToMeasure,
    Grid,
    KnnResult,
    Metric,
    UnweightedDtm,
    WeightedDtm,
    DTM_FLOOR,
};

// Re-exports from topology
pub use topology::{
    compute_cubical_persistence,
    CubicalComplex,
    CubicalPersistence,
    PersistencePair,
};

// Re-exports from summaries
pub use summaries::{Landscape, PaddedDiagram, StructureElement};

// Re-exports from pipeline
pub use pipeline::{
    BatchPipeline,
    DiagramBatch,
    GradientBatch,
    LandscapeBatch,
    LandscapeGradient,
    TopoLayer,
};

pub use scatter::scatter_add;
