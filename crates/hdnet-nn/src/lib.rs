#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Fusion of the backbone tower features.
pub mod aggregator;

/// Seed feature extractors.
pub mod backbone;

/// Network hyper-parameters.
pub mod config;

/// Dataset descriptions consumed by the heads and the loss.
pub mod dataset;

/// Typed intermediate results of a forward pass.
pub mod end_points;

/// Error types for the network.
pub mod error;

/// Boundary flag classifiers.
pub mod flags;

/// Point-wise convolution blocks.
pub mod layers;

/// The complete detector.
pub mod model;

/// Batched point sampling, grouping and gathering on tensors.
pub mod ops;

/// Bounding plane regression head.
pub mod plane;

/// Primitive and plane identifiers.
pub mod primitive;

/// Primitive proposal modules.
pub mod proposal;

/// Final proposal refinement.
pub mod refine;

/// Vote sampling strategies.
pub mod sampler;

/// Per-seed semantic cue head.
pub mod semantic;

/// Set abstraction (group and pool) layers.
pub mod set_abstraction;

/// Vote generators.
pub mod voting;

pub use config::{HdNetConfig, SamplingStrategy};
pub use dataset::DatasetConfig;
pub use end_points::EndPoints;
pub use error::{DatasetError, HdNetError};
pub use model::HdNet;
pub use primitive::{Plane, PrimitiveType};
