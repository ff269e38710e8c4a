use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::{
    config::HdNetConfig,
    end_points::SeedPoints,
    error::HdNetError,
    ops::furthest_point_sample,
    set_abstraction::{SetAbstraction, SetAbstractionConfig},
};

/// A point feature extractor producing one feature vector per seed.
pub trait Backbone: Send + Sync {
    /// Extract seeds from `(B, P, 3 + input_feature_dim)` point clouds.
    fn forward_t(&self, point_clouds: &Tensor, train: bool) -> Result<SeedPoints, HdNetError>;

    /// Width of the seed features.
    fn out_channels(&self) -> usize;
}

/// Split `(B, P, 3 + F)` point clouds into xyz `(B, P, 3)` and optional features `(B, F, P)`.
pub fn split_point_cloud(point_clouds: &Tensor) -> Result<(Tensor, Option<Tensor>), HdNetError> {
    let (_, _, c) = point_clouds.dims3()?;
    if c < 3 {
        return Err(HdNetError::ShapeMismatch {
            context: "split_point_cloud",
            expected: vec![3],
            actual: vec![c],
        });
    }

    let xyz = point_clouds.narrow(2, 0, 3)?.contiguous()?;
    let features = if c > 3 {
        Some(point_clouds.narrow(2, 3, c - 3)?.transpose(1, 2)?.contiguous()?)
    } else {
        None
    };
    Ok((xyz, features))
}

/// A single set-abstraction level over farthest point sampled seeds.
#[derive(Debug, Clone)]
pub struct PointNetBackbone {
    num_seed: usize,
    sa: SetAbstraction,
}

impl PointNetBackbone {
    /// Create the backbone described by `config`.
    pub fn new(config: &HdNetConfig, vb: VarBuilder) -> Result<Self, HdNetError> {
        let mut mlp = vec![config.input_feature_dim + 3];
        mlp.extend_from_slice(&config.backbone_mlp);
        mlp.push(config.seed_feature_dim);

        let sa = SetAbstraction::new(
            SetAbstractionConfig {
                radius: config.backbone_radius,
                nsample: config.backbone_nsample,
                mlp,
                use_xyz: true,
                normalize_xyz: true,
            },
            vb.pp("sa1"),
        )?;

        Ok(Self {
            num_seed: config.num_seed,
            sa,
        })
    }
}

impl Backbone for PointNetBackbone {
    fn forward_t(&self, point_clouds: &Tensor, train: bool) -> Result<SeedPoints, HdNetError> {
        let (xyz, features) = split_point_cloud(point_clouds)?;
        let inds = furthest_point_sample(&xyz, self.num_seed)?;
        let (seed_xyz, seed_features) = self.sa.forward_t(&xyz, features.as_ref(), &inds, train)?;

        Ok(SeedPoints {
            xyz: seed_xyz,
            features: seed_features,
            inds,
        })
    }

    fn out_channels(&self) -> usize {
        self.sa.out_channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_pointnet_backbone() -> Result<(), HdNetError> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let config = HdNetConfig {
            input_feature_dim: 1,
            num_seed: 16,
            seed_feature_dim: 32,
            backbone_mlp: vec![16],
            ..Default::default()
        };
        let backbone = PointNetBackbone::new(&config, vb)?;
        assert_eq!(backbone.out_channels(), 32);

        let point_clouds = Tensor::rand(0f32, 1., (2, 64, 4), &device)?;
        let seeds = backbone.forward_t(&point_clouds, true)?;

        assert_eq!(seeds.xyz.dims(), &[2, 16, 3]);
        assert_eq!(seeds.features.dims(), &[2, 32, 16]);
        assert_eq!(seeds.inds.dims(), &[2, 16]);
        Ok(())
    }

    #[test]
    fn test_split_point_cloud() -> Result<(), HdNetError> {
        let device = Device::Cpu;
        let pc = Tensor::zeros((1, 5, 3), DType::F32, &device)?;
        let (xyz, features) = split_point_cloud(&pc)?;
        assert_eq!(xyz.dims(), &[1, 5, 3]);
        assert!(features.is_none());

        let pc = Tensor::zeros((1, 5, 2), DType::F32, &device)?;
        assert!(split_point_cloud(&pc).is_err());
        Ok(())
    }
}
