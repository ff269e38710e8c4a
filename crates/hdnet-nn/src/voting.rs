use candle_core::Tensor;
use candle_nn::{Conv1d, Module, VarBuilder};

use crate::{
    end_points::Votes,
    error::HdNetError,
    layers::{pointwise_conv1d, Conv1dBnRelu},
    ops::l2_normalize,
};

/// Regresses, for every seed, `vote_factor` offsets and feature residuals.
///
/// A vote is the seed position plus its offset, with the seed feature plus its residual scaled
/// to unit L2 norm.
#[derive(Debug, Clone)]
pub struct VotingModule {
    vote_factor: usize,
    channels: usize,
    conv1: Conv1dBnRelu,
    conv2: Conv1dBnRelu,
    conv3: Conv1d,
}

impl VotingModule {
    /// Create the module for seeds with `channels` features.
    pub fn new(vote_factor: usize, channels: usize, vb: VarBuilder) -> Result<Self, HdNetError> {
        if vote_factor == 0 {
            return Err(HdNetError::InvalidConfig(
                "vote_factor must be positive".to_string(),
            ));
        }

        Ok(Self {
            vote_factor,
            channels,
            conv1: Conv1dBnRelu::new(channels, channels, vb.pp("conv1"))?,
            conv2: Conv1dBnRelu::new(channels, channels, vb.pp("conv2"))?,
            conv3: pointwise_conv1d(channels, (3 + channels) * vote_factor, vb.pp("conv3"))?,
        })
    }

    /// Number of votes cast by each seed.
    pub fn vote_factor(&self) -> usize {
        self.vote_factor
    }

    /// Cast the votes of seeds at `xyz` `(B, N, 3)` with `features` `(B, C, N)`.
    pub fn forward_t(
        &self,
        xyz: &Tensor,
        features: &Tensor,
        train: bool,
    ) -> Result<Votes, HdNetError> {
        let (b, c, n) = features.dims3()?;
        if c != self.channels {
            return Err(HdNetError::ShapeMismatch {
                context: "voting_module",
                expected: vec![b, self.channels, n],
                actual: vec![b, c, n],
            });
        }
        let f = self.vote_factor;

        let net = features
            .apply_t(&self.conv1, train)?
            .apply_t(&self.conv2, train)?;
        let net = self
            .conv3
            .forward(&net)?
            .transpose(1, 2)?
            .reshape((b, n, f, 3 + c))?;

        let offset = net.narrow(3, 0, 3)?.contiguous()?;
        let residual = net.narrow(3, 3, c)?.contiguous()?;

        let vote_xyz = xyz
            .unsqueeze(2)?
            .broadcast_add(&offset)?
            .reshape((b, n * f, 3))?;

        let vote_features = features
            .transpose(1, 2)?
            .unsqueeze(2)?
            .broadcast_add(&residual)?
            .reshape((b, n * f, c))?
            .transpose(1, 2)?
            .contiguous()?;
        let vote_features = l2_normalize(&vote_features, 1)?;

        Ok(Votes {
            xyz: vote_xyz,
            features: vote_features,
            offset,
            residual,
        })
    }
}
