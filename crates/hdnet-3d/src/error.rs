/// Error types for the point sampling and grouping operators.
#[derive(Debug, thiserror::Error)]
pub enum PointOpsError {
    /// The input point set has no points.
    #[error("Point set is empty")]
    EmptyPointSet,

    /// More samples were requested than the point set holds.
    #[error("Cannot sample {requested} points from a set of {available}")]
    NotEnoughPoints {
        /// Number of requested samples.
        requested: usize,
        /// Number of points in the set.
        available: usize,
    },

    /// The ball query radius is not a positive finite number.
    #[error("Invalid ball query radius: {0}")]
    InvalidRadius(f32),
}
