use candle_core::{DType, Result, Tensor};

use crate::{
    distance::{nn_distance_masked, DistanceMode},
    ops::{cross_entropy, greater_than, less_than, masked_mean},
};

/// Objectness loss and the proposal to ground truth assignment it derives.
#[derive(Debug, Clone)]
pub struct ObjectnessOutput {
    /// Weighted cross entropy over the unmasked proposals, a scalar.
    pub loss: Tensor,
    /// `1.0` for proposals near a ground truth center `(B, K)`.
    pub label: Tensor,
    /// `0.0` for proposals in the dead zone between the thresholds `(B, K)`.
    pub mask: Tensor,
    /// Index of the nearest valid ground truth box per proposal `(B, K)`, `u32`.
    pub object_assignment: Tensor,
}

/// Thresholds and class weights of the objectness loss.
#[derive(Debug, Clone)]
pub struct ObjectnessParams<'a> {
    /// Positive below this distance.
    pub near_threshold: f64,
    /// Negative above this distance.
    pub far_threshold: f64,
    /// Weights of the negative and positive class `(2,)`.
    pub class_weights: &'a Tensor,
    /// Distance added to padded boxes.
    pub padding_penalty: f64,
}

/// Classify proposals by the distance of their anchor to the nearest ground truth center.
///
/// # Arguments
///
/// * `aggregated_xyz` - Proposal anchors `(B, K, 3)`.
/// * `objectness_scores` - Logits `(B, K, 2)`.
/// * `center_label` - Ground truth centers `(B, K2, 3)`.
/// * `box_label_mask` - `1.0` for real boxes `(B, K2)`.
/// * `params` - Thresholds and class weights.
pub fn objectness_loss(
    aggregated_xyz: &Tensor,
    objectness_scores: &Tensor,
    center_label: &Tensor,
    box_label_mask: &Tensor,
    params: &ObjectnessParams,
) -> Result<ObjectnessOutput> {
    let nn = nn_distance_masked(
        aggregated_xyz,
        center_label,
        box_label_mask,
        params.padding_penalty,
        DistanceMode::L2Squared,
    )?;
    let euclidean = (nn.dist1 + 1e-6)?.sqrt()?;

    let label = less_than(&euclidean, params.near_threshold)?;
    let mask = (&label + greater_than(&euclidean, params.far_threshold)?)?;

    let ce = cross_entropy(
        objectness_scores,
        &label.to_dtype(DType::U32)?,
        Some(params.class_weights),
    )?;
    let loss = masked_mean(&ce, &mask)?;

    Ok(ObjectnessOutput {
        loss,
        label,
        mask,
        object_assignment: nn.idx1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    fn params(weights: &Tensor) -> ObjectnessParams<'_> {
        ObjectnessParams {
            near_threshold: 0.3,
            far_threshold: 0.6,
            class_weights: weights,
            padding_penalty: 1e8,
        }
    }

    #[test]
    fn test_label_and_mask() -> Result<()> {
        let device = Device::Cpu;
        let weights = Tensor::new(&[0.2f32, 0.8], &device)?;

        let xyz = Tensor::new(
            &[[[0.1f32, 0., 0.], [0.45, 0., 0.], [2., 0., 0.], [0., 0.1, 0.]]],
            &device,
        )?;
        let scores = Tensor::zeros((1, 4, 2), DType::F32, &device)?;
        let centers = Tensor::new(&[[[0f32, 0., 0.], [0., 0., 0.]]], &device)?;
        let box_mask = Tensor::new(&[[1f32, 0.]], &device)?;

        let out = objectness_loss(&xyz, &scores, &centers, &box_mask, &params(&weights))?;
        assert_eq!(out.label.to_vec2::<f32>()?, vec![vec![1., 0., 0., 1.]]);
        assert_eq!(out.mask.to_vec2::<f32>()?, vec![vec![1., 0., 1., 1.]]);
        // padded box 1 is never assigned
        assert_eq!(out.object_assignment.to_vec2::<u32>()?, vec![vec![0, 0, 0, 0]]);

        // uniform logits: ce = ln 2 weighted by the label class
        let expected = (0.8 + 0.2 + 0.8) * 2f32.ln() / 3.0;
        assert_relative_eq!(out.loss.to_scalar::<f32>()?, expected, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_all_masked_is_finite() -> Result<()> {
        let device = Device::Cpu;
        let weights = Tensor::new(&[0.2f32, 0.8], &device)?;

        // every proposal in the dead zone
        let xyz = Tensor::new(&[[[0.4f32, 0., 0.], [0., 0.5, 0.]]], &device)?;
        let scores = Tensor::randn(0f32, 1., (1, 2, 2), &device)?;
        let centers = Tensor::zeros((1, 1, 3), DType::F32, &device)?;
        let box_mask = Tensor::ones((1, 1), DType::F32, &device)?;

        let out = objectness_loss(&xyz, &scores, &centers, &box_mask, &params(&weights))?;
        assert_eq!(out.mask.sum_all()?.to_scalar::<f32>()?, 0.0);
        let loss = out.loss.to_scalar::<f32>()?;
        assert!(loss.is_finite());
        assert_eq!(loss, 0.0);
        Ok(())
    }
}
