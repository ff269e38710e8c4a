use candle_core::{Result, Tensor};
use hdnet_nn::end_points::SeedPoints;

use crate::{
    distance::DistanceMode,
    ops::{gather_seed_mask, gather_seed_targets, masked_mean, min_vote_distance},
};

/// Vote regression loss.
///
/// Every seed inside an object must cast at least one vote close to one of the `G` ground truth
/// votes of the point it was sampled from; its loss is the smallest L1 distance between its votes
/// and those targets. Seeds outside objects do not contribute.
///
/// # Arguments
///
/// * `seeds` - The seeds the votes were cast from.
/// * `vote_xyz` - Votes `(B, N*F, 3)`.
/// * `vote_label` - Offsets from every input point to its `G` targets `(B, P, 3G)`.
/// * `vote_label_mask` - `1.0` for points inside an object `(B, P)`.
///
/// # Returns
///
/// The masked mean over the seeds, a scalar.
pub fn vote_loss(
    seeds: &SeedPoints,
    vote_xyz: &Tensor,
    vote_label: &Tensor,
    vote_label_mask: &Tensor,
) -> Result<Tensor> {
    let mask = gather_seed_mask(vote_label_mask, &seeds.inds)?;

    let gt_offsets = gather_seed_targets(vote_label, &seeds.inds)?;
    let g = gt_offsets.dim(2)? / 3;
    let gt_votes = (gt_offsets + seeds.xyz.repeat((1, 1, g))?)?;

    let dist = min_vote_distance(vote_xyz, &gt_votes, DistanceMode::L1)?;
    masked_mean(&dist, &mask)
}
