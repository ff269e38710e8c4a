use candle_core::{Result, Tensor};

/// Per-coordinate penalty summed into a point-to-point distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceMode {
    /// Squared euclidean distance.
    L2Squared,
    /// Sum of absolute differences.
    L1,
    /// Sum of Huber penalties with the given delta.
    SmoothL1 {
        /// Transition point between the quadratic and the linear branch.
        delta: f64,
    },
}

/// Nearest neighbour distances between two point sets.
#[derive(Debug, Clone)]
pub struct NnDistance {
    /// Distance from every point of the first set to its nearest neighbour in the second `(B, N)`.
    pub dist1: Tensor,
    /// Index of that neighbour `(B, N)`, `u32`.
    pub idx1: Tensor,
    /// Distance from every point of the second set to its nearest neighbour in the first `(B, M)`.
    pub dist2: Tensor,
    /// Index of that neighbour `(B, M)`, `u32`.
    pub idx2: Tensor,
}

/// Huber loss of an error tensor, element-wise.
///
/// `0.5 * x^2` for `|x| <= delta`, `delta * (|x| - 0.5 * delta)` beyond.
pub fn huber_loss(error: &Tensor, delta: f64) -> Result<Tensor> {
    let abs = error.abs()?;
    let linear = abs.affine(1.0, -delta)?.relu()?;
    let quadratic = (&abs - &linear)?;
    (quadratic.sqr()? * 0.5)? + (linear * delta)?
}

/// All pairwise distances between `a` `(B, N, C)` and `b` `(B, M, C)`, `(B, N, M)`.
pub fn pairwise_distance(a: &Tensor, b: &Tensor, mode: DistanceMode) -> Result<Tensor> {
    let diff = a.unsqueeze(2)?.broadcast_sub(&b.unsqueeze(1)?)?;
    match mode {
        DistanceMode::L2Squared => diff.sqr()?.sum(3),
        DistanceMode::L1 => diff.abs()?.sum(3),
        DistanceMode::SmoothL1 { delta } => huber_loss(&diff, delta)?.sum(3),
    }
}

/// Nearest neighbours in both directions between `a` `(B, N, C)` and `b` `(B, M, C)`.
pub fn nn_distance(a: &Tensor, b: &Tensor, mode: DistanceMode) -> Result<NnDistance> {
    nearest_from_pairwise(&pairwise_distance(a, b, mode)?)
}

/// Like [`nn_distance`] but entries of `b` whose `b_mask` `(B, M)` is zero are pushed `penalty`
/// away from every point of `a`, so they are never picked while a valid entry exists.
pub fn nn_distance_masked(
    a: &Tensor,
    b: &Tensor,
    b_mask: &Tensor,
    penalty: f64,
    mode: DistanceMode,
) -> Result<NnDistance> {
    let invalid = b_mask.affine(-penalty, penalty)?.unsqueeze(1)?;
    let dist = pairwise_distance(a, b, mode)?.broadcast_add(&invalid)?;
    nearest_from_pairwise(&dist)
}

fn nearest_from_pairwise(dist: &Tensor) -> Result<NnDistance> {
    Ok(NnDistance {
        dist1: dist.min(2)?,
        idx1: dist.argmin(2)?,
        dist2: dist.min(1)?,
        idx2: dist.argmin(1)?,
    })
}
