use candle_core::{Result, Tensor, D};
use hdnet_nn::{
    end_points::{PlaneParams, PlanePredictions, SeedPoints},
    Plane,
};

use crate::{
    distance::DistanceMode,
    labels::PlaneTargets,
    ops::{gather_seed_mask, gather_seed_targets, masked_mean, min_vote_distance, seed_mask_per_vote},
};

/// Regression loss of one plane.
#[derive(Debug, Clone)]
pub struct PlaneLoss {
    /// `0.5 * rot + off`.
    pub total: Tensor,
    /// Half the normal loss.
    pub rot: Tensor,
    /// Offset loss.
    pub off: Tensor,
}

/// Match the predicted plane of every seed to the nearest of its ground truth planes.
///
/// Normals and offsets are matched separately with the L1 distance, over the seeds with a
/// plane target.
pub fn plane_loss(
    seeds: &SeedPoints,
    pred: &PlaneParams,
    targets: &PlaneTargets,
    plane_label_mask: &Tensor,
) -> Result<PlaneLoss> {
    let mask = gather_seed_mask(plane_label_mask, &seeds.inds)?;

    let rot_dist = min_vote_distance(
        &pred.rot,
        &gather_seed_targets(&targets.rot, &seeds.inds)?,
        DistanceMode::L1,
    )?;
    let off_dist = min_vote_distance(
        &pred.off.unsqueeze(2)?,
        &gather_seed_targets(&targets.off, &seeds.inds)?,
        DistanceMode::L1,
    )?;

    let rot = (masked_mean(&rot_dist, &mask)? * 0.5)?;
    let off = masked_mean(&off_dist, &mask)?;
    Ok(PlaneLoss {
        total: (&rot + &off)?,
        rot,
        off,
    })
}

/// Signed distance `n . x + d` of every vote `(B, N*F, 3)` to one plane, `(B, N*F)`.
fn signed_distance(plane: &PlaneParams, xyz: &Tensor) -> Result<Tensor> {
    (&plane.rot * xyz)?.sum(D::Minus1)? + &plane.off
}

/// Per-vote mask of the seeds with a plane target.
fn vote_mask(seeds: &SeedPoints, vote_xyz: &Tensor, plane_label_mask: &Tensor) -> Result<Tensor> {
    let mask = gather_seed_mask(plane_label_mask, &seeds.inds)?;
    let vote_factor = vote_xyz.dim(1)? / seeds.inds.dim(1)?;
    seed_mask_per_vote(&mask, vote_factor)
}

/// Corner votes must lie on one of the six predicted planes.
///
/// The loss of a vote is its smallest absolute distance to any of the planes.
pub fn corner_plane_loss(
    seeds: &SeedPoints,
    planes: &PlanePredictions,
    corner_xyz: &Tensor,
    plane_label_mask: &Tensor,
) -> Result<Tensor> {
    let distances = Plane::ALL
        .iter()
        .map(|&plane| signed_distance(planes.get(plane), corner_xyz))
        .collect::<Result<Vec<_>>>()?;
    let dist = Tensor::stack(&distances, D::Minus1)?.abs()?.min(D::Minus1)?;

    masked_mean(&dist, &vote_mask(seeds, corner_xyz, plane_label_mask)?)
}

/// Center votes must lie half way between a pair of opposite planes.
///
/// The loss of a vote is the smallest absolute sum of its signed distances to two opposite
/// planes.
pub fn center_plane_loss(
    seeds: &SeedPoints,
    planes: &PlanePredictions,
    center_xyz: &Tensor,
    plane_label_mask: &Tensor,
) -> Result<Tensor> {
    let sums = Plane::PAIRS
        .iter()
        .map(|&(a, b)| {
            signed_distance(planes.get(a), center_xyz)?
                + signed_distance(planes.get(b), center_xyz)?
        })
        .collect::<Result<Vec<_>>>()?;
    let dist = Tensor::stack(&sums, D::Minus1)?.abs()?.min(D::Minus1)?;

    masked_mean(&dist, &vote_mask(seeds, center_xyz, plane_label_mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    fn seeds(device: &Device) -> Result<SeedPoints> {
        Ok(SeedPoints {
            xyz: Tensor::zeros((1, 2, 3), DType::F32, device)?,
            features: Tensor::zeros((1, 4, 2), DType::F32, device)?,
            inds: Tensor::new(&[[0u32, 1]], device)?,
        })
    }

    /// An axis aligned unit cube centered at the origin, the same for both votes.
    ///
    /// Opposite faces share their normal and differ in offset.
    fn cube(device: &Device) -> Result<PlanePredictions> {
        let plane = |n: [f32; 3], d: f32| -> Result<PlaneParams> {
            Ok(PlaneParams {
                rot: Tensor::new(&[[n, n]], device)?,
                off: Tensor::new(&[[d, d]], device)?,
            })
        };
        Ok(PlanePredictions {
            planes: [
                plane([0., 0., 1.], -0.5)?,
                plane([0., 0., 1.], 0.5)?,
                plane([1., 0., 0.], 0.5)?,
                plane([1., 0., 0.], -0.5)?,
                plane([0., 1., 0.], -0.5)?,
                plane([0., 1., 0.], 0.5)?,
            ],
        })
    }

    #[test]
    fn test_consistency_losses() -> Result<()> {
        let device = Device::Cpu;
        let seeds = seeds(&device)?;
        let planes = cube(&device)?;
        let mask = Tensor::ones((1, 2), DType::F32, &device)?;

        let centers = Tensor::zeros((1, 2, 3), DType::F32, &device)?;
        let loss = center_plane_loss(&seeds, &planes, &centers, &mask)?;
        assert_relative_eq!(loss.to_scalar::<f32>()?, 0.0, epsilon = 1e-5);

        let corners = Tensor::new(&[[[0.5f32, 0.5, 0.5], [0.5, -0.5, 0.2]]], &device)?;
        let loss = corner_plane_loss(&seeds, &planes, &corners, &mask)?;
        assert_relative_eq!(loss.to_scalar::<f32>()?, 0.0, epsilon = 1e-5);

        // off-center by 0.1 along x and y: the z pair still balances
        let shifted = Tensor::new(&[[[0.1f32, 0.1, 0.], [0.1, 0.1, 0.]]], &device)?;
        let loss = center_plane_loss(&seeds, &planes, &shifted, &mask)?;
        assert_relative_eq!(loss.to_scalar::<f32>()?, 0.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_plane_loss() -> Result<()> {
        let device = Device::Cpu;
        let seeds = seeds(&device)?;
        let planes = cube(&device)?;
        let upper = planes.get(Plane::Upper);

        // seed 0 has the exact plane among its targets, seed 1 is off by 0.25 in offset
        let targets = PlaneTargets {
            rot: Tensor::new(
                &[[
                    [1f32, 0., 0., 0., 0., 1., 0., 0., 1.],
                    [0., 0., 1., 0., 0., 1., 0., 0., 1.],
                ]],
                &device,
            )?,
            off: Tensor::new(&[[[0f32, -0.5, -0.5], [-0.25, -0.25, -0.25]]], &device)?,
        };
        let mask = Tensor::ones((1, 2), DType::F32, &device)?;

        let loss = plane_loss(&seeds, upper, &targets, &mask)?;
        assert_relative_eq!(loss.rot.to_scalar::<f32>()?, 0.0, epsilon = 1e-5);
        assert_relative_eq!(loss.off.to_scalar::<f32>()?, 0.125, epsilon = 1e-5);
        assert_relative_eq!(loss.total.to_scalar::<f32>()?, 0.125, epsilon = 1e-5);

        let none = plane_loss(&seeds, upper, &targets, &mask.zeros_like()?)?;
        assert_eq!(none.total.to_scalar::<f32>()?, 0.0);
        Ok(())
    }
}
