//! Error types for dtm-landscape

use thiserror::Error;

/// Result type alias for dtm-landscape operations
pub type Result<T> = std::result::Result<T, TopoError>;

/// Errors raised while building or running the feature pipeline
#[derive(Error, Debug)]
pub enum TopoError {
    /// Invalid configuration value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Shape disagreement between two inputs
    #[error("Dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Which pair of inputs disagreed
        context: &'static str,
        /// Expected size
        expected: usize,
        /// Actual size received
        got: usize,
    },

    /// Empty input where non-empty was required
    #[error("Empty input: {context}")]
    EmptyInput {
        /// What was empty
        context: String,
    },

    /// Weights that cannot define a mass budget
    #[error("Degenerate weights: {reason}")]
    DegenerateWeights {
        /// Description of the degeneracy
        reason: String,
    },

    /// NaN or infinity where a finite value is needed
    #[error("Non-finite value in {context}")]
    NonFiniteValue {
        /// Where the value was found
        context: String,
    },

    /// A single sample of a batch failed
    #[error("Sample {index} failed: {source}")]
    SampleFailed {
        /// Position of the sample in the batch
        index: usize,
        /// Underlying error
        #[source]
        source: Box<TopoError>,
    },

    /// Reshape failure inside ndarray
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Configuration could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl TopoError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(context: &'static str, expected: usize, got: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            got,
        }
    }

    /// Create an empty input error
    pub fn empty_input(context: impl Into<String>) -> Self {
        Self::EmptyInput {
            context: context.into(),
        }
    }

    /// Create a degenerate weights error
    pub fn degenerate_weights(reason: impl Into<String>) -> Self {
        Self::DegenerateWeights {
            reason: reason.into(),
        }
    }

    /// Create a non-finite value error
    pub fn non_finite(context: impl Into<String>) -> Self {
        Self::NonFiniteValue {
            context: context.into(),
        }
    }

    /// Wrap an error with the index of the sample that produced it
    pub fn in_sample(self, index: usize) -> Self {
        Self::SampleFailed {
            index,
            source: Box::new(self),
        }
    }

    /// True for errors caused by the data of one sample rather than by the
    /// configuration or the caller's shapes
    pub fn is_degenerate_input(&self) -> bool {
        match self {
            Self::DegenerateWeights { .. } | Self::NonFiniteValue { .. } => true,
            Self::SampleFailed { source, .. } => source.is_degenerate_input(),
            _ => false,
        }
    }
}
