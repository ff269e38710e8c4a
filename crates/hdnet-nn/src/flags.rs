use candle_core::Tensor;
use candle_nn::{Conv1d, Module, ModuleT, VarBuilder};

use crate::{
    end_points::BoundaryFlags,
    error::HdNetError,
    layers::{pointwise_conv1d, Conv1dBnRelu},
};

/// A per-point classifier, a hidden point-wise layer followed by a linear point-wise layer.
#[derive(Debug, Clone)]
pub struct PointClassifier {
    conv1: Conv1dBnRelu,
    conv2: Conv1d,
}

impl PointClassifier {
    /// Create a classifier over `in_channels` features predicting `num_classes` logits.
    pub fn new(
        in_channels: usize,
        hidden: usize,
        num_classes: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        Ok(Self {
            conv1: Conv1dBnRelu::new(in_channels, hidden, vb.pp("conv1"))?,
            conv2: pointwise_conv1d(hidden, num_classes, vb.pp("conv2"))?,
        })
    }
}

impl ModuleT for PointClassifier {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        self.conv2.forward(&xs.apply_t(&self.conv1, train)?)
    }
}

/// Predicts whether a seed lies on a z-face, an xy-face or an edge of an object box.
#[derive(Debug, Clone)]
pub struct BoundaryFlagHeads {
    z: PointClassifier,
    xy: PointClassifier,
    edge: PointClassifier,
}

impl BoundaryFlagHeads {
    /// Create the three heads.
    pub fn new(in_channels: usize, hidden: usize, vb: VarBuilder) -> Result<Self, HdNetError> {
        Ok(Self {
            z: PointClassifier::new(in_channels, hidden, 2, vb.pp("flag_z"))?,
            xy: PointClassifier::new(in_channels, hidden, 2, vb.pp("flag_xy"))?,
            edge: PointClassifier::new(in_channels, hidden, 2, vb.pp("flag_line"))?,
        })
    }

    /// Classify every seed of the `(B, C, N)` descriptor.
    pub fn forward_t(&self, features: &Tensor, train: bool) -> Result<BoundaryFlags, HdNetError> {
        Ok(BoundaryFlags {
            z: features.apply_t(&self.z, train)?,
            xy: features.apply_t(&self.xy, train)?,
            edge: features.apply_t(&self.edge, train)?,
        })
    }
}
