use candle_core::{Result, Tensor};

use crate::{config::VoxelWeights, ops::greater_than};

fn mse(pred: &Tensor, target: &Tensor) -> Result<Tensor> {
    (pred - target)?.sqr()?.mean_all()
}

/// Occupancy grid regression loss.
///
/// The mean squared error over the whole grid, plus weighted mean squared errors restricted to
/// the cells whose target exceeds 0.9, 0.8 and 0.5. Mostly empty grids otherwise drown the
/// occupied cells.
pub fn voxel_loss(pred: &Tensor, target: &Tensor, weights: &VoxelWeights) -> Result<Tensor> {
    let mut loss = mse(pred, target)?;
    for (threshold, weight) in [
        (0.9, weights.above_0_9),
        (0.8, weights.above_0_8),
        (0.5, weights.above_0_5),
    ] {
        let mask = greater_than(target, threshold)?;
        let term = mse(&(pred * &mask)?, &(target * &mask)?)?;
        loss = (loss + (term * weight)?)?;
    }
    Ok(loss)
}
