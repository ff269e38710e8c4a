#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Combination of every loss term into the training objective.
pub mod aggregator;

/// Box regression and semantic classification losses.
pub mod box_loss;

/// Loss weights and options.
pub mod config;

/// Nearest neighbour distances between point sets.
pub mod distance;

/// Error types for the loss computation.
pub mod error;

/// Padded ground truth.
pub mod labels;

/// Objectness classification loss.
pub mod objectness;

/// Tensor helpers shared by the loss terms.
pub mod ops;

/// Bounding plane losses.
pub mod plane;

/// Per-seed semantic loss.
pub mod semantic;

/// Vote regression loss.
pub mod vote;

/// Occupancy grid loss.
pub mod voxel;

pub use aggregator::{LossAggregator, LossOutput, ObjectCueLosses, PlaneLosses};
pub use config::{LossConfig, LossWeights, VoxelWeights};
pub use error::LossError;
pub use labels::{GroundTruth, PlaneTargets};
