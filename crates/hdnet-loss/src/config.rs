use serde::{Deserialize, Serialize};

/// Weights of the three high-occupancy terms of a voxel loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelWeights {
    /// Weight of the cells with target above 0.9.
    pub above_0_9: f64,
    /// Weight of the cells with target above 0.8.
    pub above_0_8: f64,
    /// Weight of the cells with target above 0.5.
    pub above_0_5: f64,
}

/// Scalar weights combining the loss terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossWeights {
    /// Proposal vote loss.
    pub vote: f64,
    /// Objectness loss inside the proposal loss.
    pub objectness: f64,
    /// Center loss inside the box loss.
    pub center: f64,
    /// Heading classification inside the box loss.
    pub heading_cls: f64,
    /// Heading regression inside the box loss.
    pub heading_reg: f64,
    /// Size classification inside the box loss.
    pub size_cls: f64,
    /// Size regression inside the box loss.
    pub size_reg: f64,
    /// Semantic classification inside the proposal loss.
    pub sem_cls: f64,
    /// Scale of the whole proposal loss.
    pub proposal: f64,
    /// Object cue center vote loss.
    pub vote_center: f64,
    /// Object cue corner vote loss.
    pub vote_corner: f64,
    /// Seed semantic loss.
    pub seed_sem: f64,
    /// Scale of the combined voxel loss.
    pub voxel: f64,
    /// Center occupancy inside the combined voxel loss.
    pub voxel_center: f64,
    /// Corner occupancy inside the combined voxel loss.
    pub voxel_corner: f64,
    /// High-occupancy weights of the center grid.
    pub voxel_center_terms: VoxelWeights,
    /// High-occupancy weights of the corner grid.
    pub voxel_corner_terms: VoxelWeights,
    /// Scale of the sum of the six plane losses.
    pub plane: f64,
    /// Scale of the center and corner plane consistency losses.
    pub plane_consistency: f64,
    /// Share of the scaled consistency losses added to the total.
    pub plane_consistency_in_total: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            vote: 10.0,
            objectness: 0.5,
            center: 1.0,
            heading_cls: 0.1,
            heading_reg: 1.0,
            size_cls: 0.1,
            size_reg: 1.0,
            sem_cls: 0.1,
            proposal: 10.0,
            vote_center: 10.0,
            vote_corner: 10.0,
            seed_sem: 10.0,
            voxel: 50.0,
            voxel_center: 3.0,
            voxel_corner: 2.0,
            voxel_center_terms: VoxelWeights {
                above_0_9: 0.0,
                above_0_8: 250.0,
                above_0_5: 5.0,
            },
            voxel_corner_terms: VoxelWeights {
                above_0_9: 60.0,
                above_0_8: 250.0,
                above_0_5: 5.0,
            },
            plane: 10.0,
            plane_consistency: 5000.0,
            plane_consistency_in_total: 0.0,
        }
    }
}

/// Options of the loss aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Compute the object cue group (center/corner votes, seed semantics, voxels).
    pub use_objcue: bool,
    /// Compute the bounding plane group.
    pub use_plane: bool,
    /// Proposals closer than this to a ground truth center are positives.
    pub near_threshold: f64,
    /// Proposals farther than this from every ground truth center are negatives.
    pub far_threshold: f64,
    /// Number of ground truth votes stored per point.
    pub gt_vote_factor: usize,
    /// Cross entropy weights of the negative and positive objectness classes.
    pub objectness_cls_weights: [f32; 2],
    /// Distance added to padded ground truth boxes so they never win a nearest lookup.
    pub padding_penalty: f64,
    /// Term weights.
    pub weights: LossWeights,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            use_objcue: false,
            use_plane: false,
            near_threshold: 0.3,
            far_threshold: 0.6,
            gt_vote_factor: 3,
            objectness_cls_weights: [0.2, 0.8],
            padding_penalty: 1e8,
            weights: LossWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_config_json() -> Result<(), serde_json::Error> {
        let config: LossConfig =
            serde_json::from_str(r#"{"use_plane": true, "weights": {"plane": 5.0}}"#)?;
        assert!(config.use_plane);
        assert!(!config.use_objcue);
        assert_eq!(config.weights.plane, 5.0);
        assert_eq!(config.weights.vote, 10.0);
        assert_eq!(config.gt_vote_factor, 3);
        assert_eq!(config.weights.voxel_corner_terms.above_0_9, 60.0);
        Ok(())
    }
}
