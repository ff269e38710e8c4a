use std::f64::consts::PI;

use candle_core::Tensor;
use candle_nn::{Conv1d, Module, VarBuilder};

use crate::{
    config::HdNetConfig,
    dataset::DatasetConfig,
    end_points::{Detections, PrimitiveSets, SeedPoints, Votes},
    error::HdNetError,
    layers::{pointwise_conv1d, Conv1dBnRelu},
    primitive::PrimitiveType,
    sampler::VoteSampler,
    set_abstraction::{SetAbstraction, SetAbstractionConfig},
};

/// Fuses the center votes with the boundary primitive proposals into final detections.
pub trait ProposalRefiner: Send + Sync {
    /// Produce the detections scored by the loss.
    fn forward_t(
        &self,
        center_votes: &Votes,
        primitives: &PrimitiveSets,
        seeds: &SeedPoints,
        train: bool,
    ) -> Result<Detections, HdNetError>;
}

/// Decode the raw `(B, 2 + 3 + 2NH + 4NS + NC, K)` detection head output.
///
/// # Arguments
///
/// * `net` - Raw head output.
/// * `anchor` - Aggregation anchors `(B, K, 3)`; the center is the anchor plus channels 2..5.
/// * `anchor_inds` - Indices of the anchors into the vote set `(B, K)`.
/// * `features` - Proposal features `(B, C, K)` the head was applied to.
/// * `num_heading_bin` - Number of heading bins `NH`.
/// * `mean_size` - Mean size per size cluster `(NS, 3)`.
/// * `num_class` - Number of semantic classes `NC`.
pub fn decode_detection_scores(
    net: &Tensor,
    anchor: &Tensor,
    anchor_inds: &Tensor,
    features: &Tensor,
    num_heading_bin: usize,
    mean_size: &Tensor,
    num_class: usize,
) -> Result<Detections, HdNetError> {
    let num_size_cluster = mean_size.dim(0)?;
    let net = net.transpose(1, 2)?;
    let (b, k, channels) = net.dims3()?;
    let expected = 5 + 2 * num_heading_bin + 4 * num_size_cluster + num_class;
    if channels != expected {
        return Err(HdNetError::ShapeMismatch {
            context: "decode_detection_scores",
            expected: vec![b, k, expected],
            actual: vec![b, k, channels],
        });
    }

    let nh = num_heading_bin;
    let ns = num_size_cluster;
    let slice = |start: usize, len: usize| -> candle_core::Result<Tensor> {
        net.narrow(2, start, len)?.contiguous()
    };

    let objectness_scores = slice(0, 2)?;
    let center = (anchor + slice(2, 3)?)?;

    let heading_scores = slice(5, nh)?;
    let heading_residuals_normalized = slice(5 + nh, nh)?;
    let heading_residuals = (&heading_residuals_normalized * (PI / nh as f64))?;

    let size_scores = slice(5 + 2 * nh, ns)?;
    let size_residuals_normalized = slice(5 + 2 * nh + ns, 3 * ns)?.reshape((b, k, ns, 3))?;
    let size_residuals = size_residuals_normalized.broadcast_mul(&mean_size.reshape((1, 1, ns, 3))?)?;

    let sem_cls_scores = slice(5 + 2 * nh + 4 * ns, num_class)?;

    Ok(Detections {
        aggregated_xyz: anchor.clone(),
        aggregated_inds: anchor_inds.clone(),
        aggregated_features: features.clone(),
        objectness_scores,
        center,
        heading_scores,
        heading_residuals_normalized,
        heading_residuals,
        size_scores,
        size_residuals_normalized,
        size_residuals,
        sem_cls_scores,
    })
}

/// The default refinement stage.
///
/// Center votes are aggregated like a primitive module does. The primitive proposals of every
/// boundary type are then pooled around the resulting anchors, and the four descriptors are
/// decoded into oriented boxes.
#[derive(Debug)]
pub struct ProposalModuleRefine {
    num_heading_bin: usize,
    num_class: usize,
    mean_size: Tensor,
    sampler: VoteSampler,
    center_aggregation: SetAbstraction,
    z_pooling: SetAbstraction,
    xy_pooling: SetAbstraction,
    edge_pooling: SetAbstraction,
    conv1: Conv1dBnRelu,
    conv2: Conv1dBnRelu,
    conv3: Conv1d,
}

impl ProposalModuleRefine {
    /// Create the module.
    pub fn new(
        config: &HdNetConfig,
        dataset: &DatasetConfig,
        vb: VarBuilder,
    ) -> Result<Self, HdNetError> {
        let width = config.proposal_feature_dim;

        let center_aggregation = SetAbstraction::new(
            SetAbstractionConfig {
                radius: config.aggregation_radius,
                nsample: config.aggregation_nsample,
                mlp: vec![config.seed_feature_dim + 3, width, width, width],
                use_xyz: true,
                normalize_xyz: true,
            },
            vb.pp("vote_aggregation"),
        )?;

        let pooling = |name: &str| {
            SetAbstraction::new(
                SetAbstractionConfig {
                    radius: config.refine_radius,
                    nsample: config.aggregation_nsample,
                    mlp: vec![width + 3, width, width],
                    use_xyz: true,
                    normalize_xyz: true,
                },
                vb.pp(name),
            )
        };

        let num_heading_bin = dataset.num_heading_bin;
        let num_size_cluster = dataset.num_size_cluster;
        let out_channels = 5 + 2 * num_heading_bin + 4 * num_size_cluster + dataset.num_class;

        Ok(Self {
            num_heading_bin,
            num_class: dataset.num_class,
            mean_size: dataset.mean_size_tensor(vb.device())?,
            sampler: VoteSampler::new(
                config.sampling,
                config.num_proposal,
                config.seed,
                PrimitiveType::Center.index() as u64,
            ),
            center_aggregation,
            z_pooling: pooling("pool_z")?,
            xy_pooling: pooling("pool_xy")?,
            edge_pooling: pooling("pool_line")?,
            conv1: Conv1dBnRelu::new(4 * width, width, vb.pp("conv1"))?,
            conv2: Conv1dBnRelu::new(width, width, vb.pp("conv2"))?,
            conv3: pointwise_conv1d(width, out_channels, vb.pp("conv3"))?,
        })
    }

}

impl ProposalRefiner for ProposalModuleRefine {
    fn forward_t(
        &self,
        center_votes: &Votes,
        primitives: &PrimitiveSets,
        seeds: &SeedPoints,
        train: bool,
    ) -> Result<Detections, HdNetError> {
        let inds = self.sampler.sample(center_votes, seeds)?;
        let (anchor, center_features) = self.center_aggregation.forward_t(
            &center_votes.xyz,
            Some(&center_votes.features),
            &inds,
            train,
        )?;

        let mut descriptors = vec![center_features];
        for (proposals, pooling) in [
            (&primitives.z_face, &self.z_pooling),
            (&primitives.xy_face, &self.xy_pooling),
            (&primitives.edge, &self.edge_pooling),
        ] {
            descriptors.push(pooling.group_around(
                &proposals.center,
                Some(&proposals.aggregated_features),
                &anchor,
                train,
            )?);
        }
        let fused = Tensor::cat(&descriptors, 1)?;

        let features = fused
            .apply_t(&self.conv1, train)?
            .apply_t(&self.conv2, train)?;
        let net = self.conv3.forward(&features)?;

        decode_detection_scores(
            &net,
            &anchor,
            &inds,
            &features,
            self.num_heading_bin,
            &self.mean_size,
            self.num_class,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    #[test]
    fn test_decode_detection_scores() -> Result<(), HdNetError> {
        let device = Device::Cpu;
        let (nh, nc) = (2, 3);
        let mean_size = Tensor::new(&[[1f32, 2., 3.], [0.5, 0.5, 0.5]], &device)?;
        let channels = 5 + 2 * nh + 4 * 2 + nc;

        let net = Tensor::ones((1, channels, 4), DType::F32, &device)?;
        let anchor = Tensor::zeros((1, 4, 3), DType::F32, &device)?;
        let inds = Tensor::new(&[[0u32, 1, 2, 3]], &device)?;
        let features = Tensor::zeros((1, 8, 4), DType::F32, &device)?;

        let det = decode_detection_scores(&net, &anchor, &inds, &features, nh, &mean_size, nc)?;
        assert_eq!(det.objectness_scores.dims(), &[1, 4, 2]);
        assert_eq!(det.center.dims(), &[1, 4, 3]);
        assert_eq!(det.heading_scores.dims(), &[1, 4, nh]);
        assert_eq!(det.size_scores.dims(), &[1, 4, 2]);
        assert_eq!(det.size_residuals.dims(), &[1, 4, 2, 3]);
        assert_eq!(det.sem_cls_scores.dims(), &[1, 4, nc]);

        let heading = det.heading_residuals.flatten_all()?.to_vec1::<f32>()?;
        assert_relative_eq!(heading[0], std::f32::consts::FRAC_PI_2, epsilon = 1e-6);

        let size = det.size_residuals.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(&size[..6], &[1., 2., 3., 0.5, 0.5, 0.5]);
        Ok(())
    }
}
