use candle_core::{Result, Tensor, D};
use hdnet_nn::end_points::{SeedPoints, SeedSemantics};

use crate::ops::{cross_entropy, gather_seed_mask, gather_seed_targets, masked_mean};

/// Background seeds are down-weighted by this factor.
const BACKGROUND_WEIGHT: f64 = 0.2;

/// Per-seed semantic classification loss.
///
/// A seed may lie in up to `G` objects; each head is scored against the closest of their
/// labels. Seeds on objects and background seeds are averaged separately.
///
/// # Arguments
///
/// * `seeds` - The seeds the heads classified.
/// * `semantics` - Logits of the three heads, each `(B, num_class, N)`.
/// * `point_sem_cls_label` - Labels of the enclosing objects per point `(B, P, G)`, `u32`.
/// * `vote_label_mask` - `1.0` for points inside an object `(B, P)`.
pub fn seed_semantic_loss(
    seeds: &SeedPoints,
    semantics: &SeedSemantics,
    point_sem_cls_label: &Tensor,
    vote_label_mask: &Tensor,
) -> Result<Tensor> {
    let mask = gather_seed_mask(vote_label_mask, &seeds.inds)?;
    let background = mask.affine(-1.0, 1.0)?;
    let labels = gather_seed_targets(point_sem_cls_label, &seeds.inds)?;
    let g = labels.dim(2)?;

    let mut total: Option<Tensor> = None;
    for head in semantics.heads.iter() {
        let logits = head.transpose(1, 2)?.contiguous()?;
        let per_label = (0..g)
            .map(|j| cross_entropy(&logits, &labels.narrow(2, j, 1)?.squeeze(2)?, None))
            .collect::<Result<Vec<_>>>()?;
        let ce = Tensor::stack(&per_label, D::Minus1)?.min(D::Minus1)?;

        let loss = (masked_mean(&ce, &mask)?
            + (masked_mean(&ce, &background)? * BACKGROUND_WEIGHT)?)?;
        total = Some(match total {
            Some(t) => (t + loss)?,
            None => loss,
        });
    }

    match total {
        Some(t) => Ok(t),
        None => Tensor::zeros((), mask.dtype(), mask.device()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    #[test]
    fn test_best_label_is_used() -> Result<()> {
        let device = Device::Cpu;
        let seeds = SeedPoints {
            xyz: Tensor::zeros((1, 2, 3), DType::F32, &device)?,
            features: Tensor::zeros((1, 4, 2), DType::F32, &device)?,
            inds: Tensor::new(&[[1u32, 0]], &device)?,
        };

        // both seeds confidently predict class 2
        let logits = Tensor::new(&[[[0f32, 0.], [0., 0.], [20., 20.]]], &device)?;
        let semantics = SeedSemantics {
            heads: [logits.clone(), logits.clone(), logits],
        };

        // point 1 is an object whose second label is class 2, point 0 background
        let labels = Tensor::new(&[[[0u32, 0, 0], [1, 2, 1]]], &device)?;
        let mask = Tensor::new(&[[0f32, 1.]], &device)?;

        let loss = seed_semantic_loss(&seeds, &semantics, &labels, &mask)?.to_scalar::<f32>()?;

        // object seed: ~0, background seed: ~20 weighted by 0.2, three heads
        assert_relative_eq!(loss, 3.0 * 0.2 * 20.0, epsilon = 1e-2);
        Ok(())
    }
}
