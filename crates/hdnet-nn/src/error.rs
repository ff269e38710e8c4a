use hdnet_3d::PointOpsError;

/// Error types for the network module.
#[derive(Debug, thiserror::Error)]
pub enum HdNetError {
    /// Error raised by the tensor backend.
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Error raised by the point sampling and grouping operators.
    #[error("Point operator error: {0}")]
    PointOps(#[from] PointOpsError),

    /// The requested vote sampling strategy does not exist.
    #[error("Unknown sampling strategy: {0}")]
    UnknownSamplingStrategy(String),

    /// Two tensors that must agree in shape do not.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Where the mismatch was detected.
        context: &'static str,
        /// The expected dimensions.
        expected: Vec<usize>,
        /// The dimensions found.
        actual: Vec<usize>,
    },

    /// The network configuration is inconsistent.
    #[error("Invalid network configuration: {0}")]
    InvalidConfig(String),

    /// The dataset configuration is unusable.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Error types for the dataset configuration.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Failed to read or write a dataset configuration file.
    #[error("Failed to access dataset configuration file")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize a dataset configuration.
    #[error("Failed to (de)serialize dataset configuration")]
    Json(#[from] serde_json::Error),

    /// The dataset name is not supported.
    #[error("Unsupported dataset: {0}")]
    UnsupportedDataset(String),

    /// The number of mean sizes does not match the number of size clusters.
    #[error("Expected {expected} mean sizes, got {actual}")]
    InvalidMeanSizes {
        /// The number of size clusters.
        expected: usize,
        /// The number of mean sizes found.
        actual: usize,
    },
}
