use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::{end_points::SeedSemantics, error::HdNetError, flags::PointClassifier};

/// Three independent per-seed semantic classifiers.
///
/// A seed inside several overlapping boxes may belong to up to three objects, every head is
/// matched to the closest of those labels by the loss.
#[derive(Debug, Clone)]
pub struct SeedSemanticHead {
    heads: [PointClassifier; 3],
}

impl SeedSemanticHead {
    /// Create the heads over `channels` seed features for `num_class` classes.
    pub fn new(
        channels: usize,
        hidden: usize,
        num_class: usize,
        vb: VarBuilder,
    ) -> Result<Self, HdNetError> {
        Ok(Self {
            heads: [
                PointClassifier::new(channels, hidden, num_class, vb.pp("sem1"))?,
                PointClassifier::new(channels, hidden, num_class, vb.pp("sem2"))?,
                PointClassifier::new(channels, hidden, num_class, vb.pp("sem3"))?,
            ],
        })
    }

    /// Classify every seed of the `(B, C, N)` descriptor into `(B, num_class, N)` logits.
    pub fn forward_t(&self, features: &Tensor, train: bool) -> Result<SeedSemantics, HdNetError> {
        let [h1, h2, h3] = &self.heads;
        Ok(SeedSemantics {
            heads: [
                features.apply_t(h1, train)?,
                features.apply_t(h2, train)?,
                features.apply_t(h3, train)?,
            ],
        })
    }
}
