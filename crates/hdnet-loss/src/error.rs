use hdnet_nn::DatasetError;

/// Error types for the loss computation.
#[derive(Debug, thiserror::Error)]
pub enum LossError {
    /// Error raised by the tensor backend, including shape mismatches between predictions and
    /// targets.
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// An enabled loss group lacks one of its inputs.
    #[error("Missing loss input: {0}")]
    MissingInput(&'static str),

    /// A target does not hold `gt_vote_factor` entries per point.
    #[error("Target {name} has {actual} channels, expected {expected}")]
    TargetShape {
        /// Name of the target.
        name: &'static str,
        /// Expected channel count.
        expected: usize,
        /// Actual channel count.
        actual: usize,
    },

    /// The dataset configuration is unusable.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
