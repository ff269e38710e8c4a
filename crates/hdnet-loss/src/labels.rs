//! Padded ground truth of a batch.
//!
//! Shapes use `B` for the batch size, `P` for the number of input points, `K2` for the padded
//! number of boxes and `G` for the number of ground truth votes per point.

use candle_core::Tensor;
use hdnet_nn::Plane;

/// Vote targets of one bounding plane.
#[derive(Debug, Clone)]
pub struct PlaneTargets {
    /// Plane normals per point `(B, P, 3G)`.
    pub rot: Tensor,
    /// Plane offsets per point `(B, P, G)`.
    pub off: Tensor,
}

/// Ground truth consumed by the loss.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    /// Offsets from every point to the centers of up to `G` enclosing objects `(B, P, 3G)`.
    pub vote_label: Tensor,
    /// `1.0` for points inside an object `(B, P)`.
    pub vote_label_mask: Tensor,
    /// Box centers `(B, K2, 3)`.
    pub center_label: Tensor,
    /// Heading bins `(B, K2)`, `u32`.
    pub heading_class_label: Tensor,
    /// Heading residuals in radians `(B, K2)`.
    pub heading_residual_label: Tensor,
    /// Size clusters `(B, K2)`, `u32`.
    pub size_class_label: Tensor,
    /// Size residuals in meters `(B, K2, 3)`.
    pub size_residual_label: Tensor,
    /// Semantic classes `(B, K2)`, `u32`.
    pub sem_cls_label: Tensor,
    /// `1.0` for real boxes, `0.0` for padding `(B, K2)`.
    pub box_label_mask: Tensor,
    /// Offsets from every point to the nearest corners of up to `G` objects `(B, P, 3G)`.
    pub vote_label_corner: Option<Tensor>,
    /// `1.0` for points with plane targets `(B, P)`.
    pub plane_label_mask: Option<Tensor>,
    /// Plane targets in [`Plane::ALL`] order.
    pub plane_votes: Option<[PlaneTargets; 6]>,
    /// Semantic classes of up to `G` enclosing objects per point `(B, P, G)`, `u32`.
    pub point_sem_cls_label: Option<Tensor>,
    /// Target center occupancy grid.
    pub vox_center: Option<Tensor>,
    /// Target corner occupancy grid.
    pub vox_corner: Option<Tensor>,
}

impl GroundTruth {
    /// The targets of one plane, if plane targets are present.
    pub fn plane(&self, plane: Plane) -> Option<&PlaneTargets> {
        self.plane_votes.as_ref().map(|p| &p[plane.index()])
    }
}
