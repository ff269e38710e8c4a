use candle_core::Tensor;
use candle_nn::{Conv1d, Module, VarBuilder};

use crate::{
    config::HdNetConfig,
    end_points::{PrimitiveProposals, SeedPoints, Votes},
    error::HdNetError,
    layers::{pointwise_conv1d, Conv1dBnRelu},
    primitive::PrimitiveType,
    sampler::VoteSampler,
    set_abstraction::{SetAbstraction, SetAbstractionConfig},
};

/// Decoded primitive head outputs.
#[derive(Debug, Clone)]
pub struct PrimitiveScores {
    /// Primitive centers `(B, K, 3)`.
    pub center: Tensor,
    /// Size residuals `(B, K, d)`.
    pub size_residuals: Option<Tensor>,
    /// Semantic class logits `(B, K, num_class)`.
    pub sem_cls_scores: Tensor,
}

/// Split the raw `(B, 3 + d + num_class, K)` head output of a primitive module.
///
/// The first three channels are the offset from `anchor` `(B, K, 3)`, the next
/// [`PrimitiveType::size_residual_dim`] channels the size residual and the rest semantic scores.
pub fn decode_primitive_scores(
    net: &Tensor,
    anchor: &Tensor,
    kind: PrimitiveType,
    num_class: usize,
) -> Result<PrimitiveScores, HdNetError> {
    let d = kind.size_residual_dim();
    let net = net.transpose(1, 2)?;
    let (b, k, channels) = net.dims3()?;
    if channels != 3 + d + num_class {
        return Err(HdNetError::ShapeMismatch {
            context: "decode_primitive_scores",
            expected: vec![b, k, 3 + d + num_class],
            actual: vec![b, k, channels],
        });
    }

    let center = (anchor + net.narrow(2, 0, 3)?)?;
    let size_residuals = if d > 0 {
        Some(net.narrow(2, 3, d)?.contiguous()?)
    } else {
        None
    };
    let sem_cls_scores = net.narrow(2, 3 + d, num_class)?.contiguous()?;

    Ok(PrimitiveScores {
        center,
        size_residuals,
        sem_cls_scores,
    })
}

/// Aggregates the votes of one boundary primitive into a fixed number of proposals.
#[derive(Debug)]
pub struct PrimitiveModule {
    kind: PrimitiveType,
    num_class: usize,
    sampler: VoteSampler,
    aggregation: SetAbstraction,
    conv1: Conv1dBnRelu,
    conv2: Conv1dBnRelu,
    conv3: Conv1d,
}

impl PrimitiveModule {
    /// Create the module of primitive `kind` for a dataset of `num_class` classes.
    pub fn new(
        kind: PrimitiveType,
        config: &HdNetConfig,
        num_class: usize,
        vb: VarBuilder,
    ) -> Result<Self, HdNetError> {
        let width = config.proposal_feature_dim;
        let aggregation = SetAbstraction::new(
            SetAbstractionConfig {
                radius: config.aggregation_radius,
                nsample: config.aggregation_nsample,
                mlp: vec![config.seed_feature_dim + 3, width, width, width],
                use_xyz: true,
                normalize_xyz: true,
            },
            vb.pp("vote_aggregation"),
        )?;

        Ok(Self {
            kind,
            num_class,
            sampler: VoteSampler::new(
                config.sampling,
                config.num_proposal,
                config.seed,
                kind.index() as u64,
            ),
            aggregation,
            conv1: Conv1dBnRelu::new(width, width, vb.pp("conv1"))?,
            conv2: Conv1dBnRelu::new(width, width, vb.pp("conv2"))?,
            conv3: pointwise_conv1d(
                width,
                3 + kind.size_residual_dim() + num_class,
                vb.pp("conv3"),
            )?,
        })
    }

    /// The primitive the module handles.
    pub fn kind(&self) -> PrimitiveType {
        self.kind
    }

    /// Sample, group and decode the votes into proposals.
    pub fn forward_t(
        &self,
        votes: &Votes,
        seeds: &SeedPoints,
        train: bool,
    ) -> Result<PrimitiveProposals, HdNetError> {
        let inds = self.sampler.sample(votes, seeds)?;
        let (aggregated_xyz, aggregated_features) =
            self.aggregation
                .forward_t(&votes.xyz, Some(&votes.features), &inds, train)?;

        let net = aggregated_features
            .apply_t(&self.conv1, train)?
            .apply_t(&self.conv2, train)?;
        let net = self.conv3.forward(&net)?;

        let scores = decode_primitive_scores(&net, &aggregated_xyz, self.kind, self.num_class)?;
        log::trace!("{} proposals: {:?}", self.kind, scores.center.dims());

        Ok(PrimitiveProposals {
            kind: self.kind,
            aggregated_xyz,
            aggregated_inds: inds,
            aggregated_features,
            center: scores.center,
            size_residuals: scores.size_residuals,
            sem_cls_scores: scores.sem_cls_scores,
        })
    }
}
