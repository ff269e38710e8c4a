//! Typed intermediate results of a forward pass.
//!
//! Every stage of the network writes one of these structures and later stages, including the
//! loss, read them. Shapes use `B` for the batch size, `N` for the number of seeds, `F` for the
//! vote factor, `K` for the number of proposals and `C` for feature widths.

use candle_core::Tensor;

use crate::primitive::{Plane, PrimitiveType};

/// Down-sampled input points carrying a feature vector, the unit of voting.
#[derive(Debug, Clone)]
pub struct SeedPoints {
    /// Seed positions `(B, N, 3)`.
    pub xyz: Tensor,
    /// Seed features `(B, C, N)`.
    pub features: Tensor,
    /// Indices of the seeds into the input point cloud `(B, N)`, `u32`.
    pub inds: Tensor,
}

/// The votes cast by every seed for one primitive type.
#[derive(Debug, Clone)]
pub struct Votes {
    /// Vote positions `(B, N*F, 3)`.
    pub xyz: Tensor,
    /// Unit norm vote features `(B, C, N*F)`.
    pub features: Tensor,
    /// Raw predicted offsets `(B, N, F, 3)`.
    pub offset: Tensor,
    /// Raw predicted feature residuals `(B, N, F, C)`.
    pub residual: Tensor,
}

/// The four vote sets, one per primitive type.
#[derive(Debug, Clone)]
pub struct VoteSets {
    /// Object center votes.
    pub center: Votes,
    /// Upper/lower face center votes.
    pub z_face: Votes,
    /// Side face center votes.
    pub xy_face: Votes,
    /// Edge center votes.
    pub edge: Votes,
}

impl VoteSets {
    /// The vote set of a primitive type.
    pub fn get(&self, kind: PrimitiveType) -> &Votes {
        match kind {
            PrimitiveType::Center => &self.center,
            PrimitiveType::ZFace => &self.z_face,
            PrimitiveType::XyFace => &self.xy_face,
            PrimitiveType::Edge => &self.edge,
        }
    }
}

/// Per-seed boundary flag logits, each `(B, 2, N)`.
#[derive(Debug, Clone)]
pub struct BoundaryFlags {
    /// Seed lies on an upper or lower face.
    pub z: Tensor,
    /// Seed lies on a side face.
    pub xy: Tensor,
    /// Seed lies on an edge.
    pub edge: Tensor,
}

/// Proposals aggregated from the votes of one boundary primitive type.
#[derive(Debug, Clone)]
pub struct PrimitiveProposals {
    /// Which primitive the proposals describe.
    pub kind: PrimitiveType,
    /// Aggregation anchors `(B, K, 3)`.
    pub aggregated_xyz: Tensor,
    /// Indices of the anchors into the vote set `(B, K)`, `u32`.
    pub aggregated_inds: Tensor,
    /// Aggregated features `(B, C, K)`.
    pub aggregated_features: Tensor,
    /// Predicted primitive centers `(B, K, 3)`.
    pub center: Tensor,
    /// Predicted size residuals `(B, K, d)`; absent when the primitive has no size channels.
    pub size_residuals: Option<Tensor>,
    /// Semantic class logits `(B, K, num_class)`.
    pub sem_cls_scores: Tensor,
}

/// The three boundary primitive proposal sets.
#[derive(Debug, Clone)]
pub struct PrimitiveSets {
    /// Upper/lower face proposals.
    pub z_face: PrimitiveProposals,
    /// Side face proposals.
    pub xy_face: PrimitiveProposals,
    /// Edge proposals.
    pub edge: PrimitiveProposals,
}

impl PrimitiveSets {
    /// The proposals of a boundary primitive type, `None` for [`PrimitiveType::Center`].
    pub fn get(&self, kind: PrimitiveType) -> Option<&PrimitiveProposals> {
        match kind {
            PrimitiveType::Center => None,
            PrimitiveType::ZFace => Some(&self.z_face),
            PrimitiveType::XyFace => Some(&self.xy_face),
            PrimitiveType::Edge => Some(&self.edge),
        }
    }
}

/// Final detections, the proposal set scored by the loss.
#[derive(Debug, Clone)]
pub struct Detections {
    /// Aggregation anchors `(B, K, 3)`.
    pub aggregated_xyz: Tensor,
    /// Indices of the anchors into the center vote set `(B, K)`, `u32`.
    pub aggregated_inds: Tensor,
    /// Fused proposal features `(B, C, K)`.
    pub aggregated_features: Tensor,
    /// Objectness logits `(B, K, 2)`.
    pub objectness_scores: Tensor,
    /// Box centers `(B, K, 3)`.
    pub center: Tensor,
    /// Heading bin logits `(B, K, NH)`.
    pub heading_scores: Tensor,
    /// Heading residuals normalized by the bin width `(B, K, NH)`.
    pub heading_residuals_normalized: Tensor,
    /// Heading residuals in radians `(B, K, NH)`.
    pub heading_residuals: Tensor,
    /// Size cluster logits `(B, K, NS)`.
    pub size_scores: Tensor,
    /// Size residuals normalized by the cluster mean size `(B, K, NS, 3)`.
    pub size_residuals_normalized: Tensor,
    /// Size residuals in meters `(B, K, NS, 3)`.
    pub size_residuals: Tensor,
    /// Semantic class logits `(B, K, num_class)`.
    pub sem_cls_scores: Tensor,
}

/// Parameters of one bounding plane predicted per vote.
#[derive(Debug, Clone)]
pub struct PlaneParams {
    /// Unit plane normal `(B, N*F, 3)`.
    pub rot: Tensor,
    /// Plane offset `(B, N*F)`.
    pub off: Tensor,
}

/// The six bounding planes predicted per seed.
#[derive(Debug, Clone)]
pub struct PlanePredictions {
    /// Planes in [`Plane::ALL`] order.
    pub planes: [PlaneParams; 6],
}

impl PlanePredictions {
    /// The parameters of one plane.
    pub fn get(&self, plane: Plane) -> &PlaneParams {
        &self.planes[plane.index()]
    }
}

/// Three per-seed semantic classifiers `(B, num_class, N)`.
#[derive(Debug, Clone)]
pub struct SeedSemantics {
    /// The classifier logits.
    pub heads: [Tensor; 3],
}

/// Dense occupancy grids predicted by a voxel decoder.
#[derive(Debug, Clone)]
pub struct VoxelPredictions {
    /// Object center occupancy.
    pub center: Tensor,
    /// Object corner occupancy.
    pub corner: Tensor,
}

/// Everything a forward pass produces.
#[derive(Debug, Clone)]
pub struct EndPoints {
    /// Seeds of the first backbone tower.
    pub seeds: SeedPoints,
    /// Aggregated seed descriptor `(B, C, N)`.
    pub hd_feature: Tensor,
    /// Boundary flag logits.
    pub flags: BoundaryFlags,
    /// Votes per primitive type.
    pub votes: VoteSets,
    /// Boundary primitive proposals.
    pub primitives: PrimitiveSets,
    /// Final detections.
    pub detections: Detections,
    /// Bounding plane predictions, when the plane head is enabled.
    pub planes: Option<PlanePredictions>,
    /// Per-seed semantic cues, when the object cue head is enabled.
    pub seed_semantics: Option<SeedSemantics>,
    /// Voxel occupancy grids, filled in by an external voxel decoder.
    pub voxels: Option<VoxelPredictions>,
}
