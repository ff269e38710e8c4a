use candle_core::{DType, Result, Tensor, D};
use candle_nn::ops::log_softmax;

use crate::distance::{pairwise_distance, DistanceMode};

/// `sum(values * mask) / (sum(mask) + 1e-6)`, a scalar.
pub fn masked_mean(values: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let numerator = (values * mask)?.sum_all()?;
    let denominator = (mask.sum_all()? + 1e-6)?;
    numerator / denominator
}

/// Per-element cross entropy of `(B, K, C)` logits against `(B, K)` `u32` labels, `(B, K)`.
///
/// With `class_weights` `(C,)` every element is scaled by the weight of its label.
pub fn cross_entropy(
    logits: &Tensor,
    labels: &Tensor,
    class_weights: Option<&Tensor>,
) -> Result<Tensor> {
    let labels = labels.to_dtype(DType::U32)?;
    let log_probs = log_softmax(logits, D::Minus1)?;
    let nll = log_probs
        .gather(&labels.unsqueeze(2)?.contiguous()?, 2)?
        .squeeze(2)?
        .neg()?;

    match class_weights {
        Some(weights) => {
            let w = weights
                .index_select(&labels.flatten_all()?, 0)?
                .reshape(labels.shape())?;
            nll * w
        }
        None => Ok(nll),
    }
}

/// Select `(B, K)` entries from a `(B, K2)` tensor with `(B, K)` indices.
pub fn gather_rows(xs: &Tensor, idx: &Tensor) -> Result<Tensor> {
    xs.contiguous()?.gather(&idx.contiguous()?, 1)
}

/// Select `(B, K, D)` rows from a `(B, K2, D)` tensor with `(B, K)` indices.
pub fn gather_rows3(xs: &Tensor, idx: &Tensor) -> Result<Tensor> {
    let (b, k) = idx.dims2()?;
    let d = xs.dim(2)?;
    let idx = idx.unsqueeze(2)?.broadcast_as((b, k, d))?.contiguous()?;
    xs.contiguous()?.gather(&idx, 1)
}

/// `1.0` where `xs > value`, `0.0` elsewhere, in the dtype of `xs`.
pub fn greater_than(xs: &Tensor, value: f64) -> Result<Tensor> {
    xs.affine(1.0, -value)?
        .gt(&xs.zeros_like()?)?
        .to_dtype(xs.dtype())
}

/// `1.0` where `xs < value`, `0.0` elsewhere, in the dtype of `xs`.
pub fn less_than(xs: &Tensor, value: f64) -> Result<Tensor> {
    xs.affine(-1.0, value)?
        .gt(&xs.zeros_like()?)?
        .to_dtype(xs.dtype())
}

/// Gather the per-point targets `(B, P, D)` of every seed, `(B, N, D)`.
pub fn gather_seed_targets(targets: &Tensor, seed_inds: &Tensor) -> Result<Tensor> {
    gather_rows3(targets, &seed_inds.to_dtype(DType::U32)?)
}

/// Gather a per-point mask `(B, P)` at the seeds, `(B, N)`.
pub fn gather_seed_mask(mask: &Tensor, seed_inds: &Tensor) -> Result<Tensor> {
    gather_rows(mask, &seed_inds.to_dtype(DType::U32)?)
}

/// Spread a per-seed mask `(B, N)` to every one of the seed's `vote_factor` votes, `(B, N*F)`.
pub fn seed_mask_per_vote(mask: &Tensor, vote_factor: usize) -> Result<Tensor> {
    let (b, n) = mask.dims2()?;
    mask.unsqueeze(2)?
        .broadcast_as((b, n, vote_factor))?
        .contiguous()?
        .reshape((b, n * vote_factor))
}

/// For every seed, the smallest distance between any of its predicted votes and any of its
/// ground truth targets.
///
/// # Arguments
///
/// * `pred` - Predicted votes `(B, N*F, C)`, the `F` votes of a seed consecutive.
/// * `targets` - Ground truth `(B, N, G*C)`, `G` targets of `C` values per seed.
/// * `mode` - Distance used to compare a vote and a target.
///
/// # Returns
///
/// The distances `(B, N)`.
pub fn min_vote_distance(pred: &Tensor, targets: &Tensor, mode: DistanceMode) -> Result<Tensor> {
    let (b, n, gc) = targets.dims3()?;
    let c = pred.dim(2)?;
    let pred = pred.reshape((b * n, (), c))?;
    let targets = targets.reshape((b * n, gc / c, c))?;

    // nearest vote per target, then the best target
    pairwise_distance(&pred, &targets, mode)?
        .min(1)?
        .min(1)?
        .reshape((b, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    #[test]
    fn test_masked_mean_empty_mask() -> Result<()> {
        let device = Device::Cpu;
        let values = Tensor::new(&[[1f32, 2., 3.]], &device)?;
        let empty = values.zeros_like()?;
        assert_eq!(masked_mean(&values, &empty)?.to_scalar::<f32>()?, 0.0);

        let mask = Tensor::new(&[[1f32, 0., 1.]], &device)?;
        assert_relative_eq!(
            masked_mean(&values, &mask)?.to_scalar::<f32>()?,
            2.0,
            epsilon = 1e-5
        );
        Ok(())
    }

    #[test]
    fn test_cross_entropy() -> Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[[0f32, 0.], [2f32.ln(), 0.]]], &device)?;
        let labels = Tensor::new(&[[1u32, 0]], &device)?;

        let ce = cross_entropy(&logits, &labels, None)?.to_vec2::<f32>()?;
        assert_relative_eq!(ce[0][0], 2f32.ln(), epsilon = 1e-6);
        assert_relative_eq!(ce[0][1], (1.5f32).ln(), epsilon = 1e-6);

        let weights = Tensor::new(&[0.2f32, 0.8], &device)?;
        let ce = cross_entropy(&logits, &labels, Some(&weights))?.to_vec2::<f32>()?;
        assert_relative_eq!(ce[0][0], 0.8 * 2f32.ln(), epsilon = 1e-6);
        assert_relative_eq!(ce[0][1], 0.2 * (1.5f32).ln(), epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_thresholds() -> Result<()> {
        let device = Device::Cpu;
        let xs = Tensor::new(&[0.1f32, 0.3, 0.5, 0.7], &device)?;
        assert_eq!(less_than(&xs, 0.3)?.to_vec1::<f32>()?, vec![1., 0., 0., 0.]);
        assert_eq!(greater_than(&xs, 0.6)?.to_vec1::<f32>()?, vec![0., 0., 0., 1.]);
        Ok(())
    }

    #[test]
    fn test_min_vote_distance() -> Result<()> {
        let device = Device::Cpu;
        // one seed, two votes, two targets
        let pred = Tensor::new(&[[[0f32, 0., 0.], [5., 5., 5.]]], &device)?;
        let targets = Tensor::new(&[[[1f32, 0., 0., 5., 5., 4.5]]], &device)?;
        let d = min_vote_distance(&pred, &targets, DistanceMode::L1)?;
        assert_eq!(d.dims(), &[1, 1]);
        assert_relative_eq!(d.to_vec2::<f32>()?[0][0], 0.5);
        Ok(())
    }
}
