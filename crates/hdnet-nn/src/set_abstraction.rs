use candle_core::{Tensor, D};
use candle_nn::{ModuleT, VarBuilder};

use crate::{
    error::HdNetError,
    layers::SharedMlp,
    ops::{ball_query, gather_points, group_features},
};

/// Options of a [`SetAbstraction`] level.
#[derive(Debug, Clone, PartialEq)]
pub struct SetAbstractionConfig {
    /// Ball query radius.
    pub radius: f32,
    /// Neighbours gathered per center.
    pub nsample: usize,
    /// Widths of the shared MLP, input width first (including the 3 xyz channels when `use_xyz`).
    pub mlp: Vec<usize>,
    /// Concatenate the relative neighbour positions to the grouped features.
    pub use_xyz: bool,
    /// Divide the relative neighbour positions by the radius.
    pub normalize_xyz: bool,
}

/// Groups points around a set of centers and max-pools a shared MLP over every group.
#[derive(Debug, Clone)]
pub struct SetAbstraction {
    config: SetAbstractionConfig,
    mlp: SharedMlp,
}

impl SetAbstraction {
    /// Create the level and its MLP weights under `vb`.
    pub fn new(config: SetAbstractionConfig, vb: VarBuilder) -> Result<Self, HdNetError> {
        if config.mlp.len() < 2 {
            return Err(HdNetError::InvalidConfig(
                "set abstraction mlp needs an input and an output width".to_string(),
            ));
        }
        let mlp = SharedMlp::new(&config.mlp, vb.pp("mlp"))?;
        Ok(Self { config, mlp })
    }

    /// Width of the pooled features.
    pub fn out_channels(&self) -> usize {
        self.mlp.out_channels()
    }

    /// Pool the points around the centers picked by `inds`.
    ///
    /// # Arguments
    ///
    /// * `xyz` - Points `(B, N, 3)`.
    /// * `features` - Optional point features `(B, C, N)`.
    /// * `inds` - Indices of the centers into `xyz`, `(B, K)` `u32`.
    /// * `train` - Batch norm mode.
    ///
    /// # Returns
    ///
    /// The centers `(B, K, 3)` and their pooled features `(B, C', K)`.
    pub fn forward_t(
        &self,
        xyz: &Tensor,
        features: Option<&Tensor>,
        inds: &Tensor,
        train: bool,
    ) -> Result<(Tensor, Tensor), HdNetError> {
        let new_xyz = gather_points(xyz, inds)?;
        let pooled = self.group_around(xyz, features, &new_xyz, train)?;
        Ok((new_xyz, pooled))
    }

    /// Pool the points around arbitrary centers `new_xyz` `(B, K, 3)` into `(B, C', K)`.
    pub fn group_around(
        &self,
        xyz: &Tensor,
        features: Option<&Tensor>,
        new_xyz: &Tensor,
        train: bool,
    ) -> Result<Tensor, HdNetError> {
        let idx = ball_query(xyz, new_xyz, self.config.radius, self.config.nsample)?;

        // (B, 3, K, S) relative to the centers
        let grouped_xyz = group_features(&xyz.transpose(1, 2)?, &idx)?
            .broadcast_sub(&new_xyz.transpose(1, 2)?.unsqueeze(3)?)?;
        let grouped_xyz = if self.config.normalize_xyz {
            (grouped_xyz / self.config.radius as f64)?
        } else {
            grouped_xyz
        };

        let grouped = match (features, self.config.use_xyz) {
            (Some(features), true) => {
                Tensor::cat(&[&grouped_xyz, &group_features(features, &idx)?], 1)?
            }
            (Some(features), false) => group_features(features, &idx)?,
            (None, _) => grouped_xyz,
        };

        let expected = self.config.mlp[0];
        let actual = grouped.dim(1)?;
        if expected != actual {
            return Err(HdNetError::ShapeMismatch {
                context: "set_abstraction",
                expected: vec![expected],
                actual: vec![actual],
            });
        }

        Ok(self.mlp.forward_t(&grouped, train)?.max(D::Minus1)?)
    }
}
