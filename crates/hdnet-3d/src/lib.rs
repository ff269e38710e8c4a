#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the point operators.
pub mod error;

/// Neighbourhood grouping of points (ball query).
pub mod grouping;

/// Point subset selection (farthest point and random sampling).
pub mod sampling;

pub use error::PointOpsError;
