use std::f64::consts::PI;

use candle_core::{Result, Tensor, D};
use hdnet_nn::end_points::Detections;

use crate::{
    distance::{huber_loss, nn_distance_masked, DistanceMode},
    labels::GroundTruth,
    ops::{cross_entropy, gather_rows, gather_rows3, masked_mean},
};

/// Box regression and semantic classification terms.
#[derive(Debug, Clone)]
pub struct BoxLosses {
    /// Proposal to nearest ground truth center distance over positive proposals.
    pub centroid_reg_loss1: Tensor,
    /// Ground truth to nearest proposal center distance over real boxes.
    pub centroid_reg_loss2: Tensor,
    /// Sum of the two centroid terms.
    pub center_loss: Tensor,
    /// Heading bin cross entropy.
    pub heading_cls_loss: Tensor,
    /// Huber loss of the normalized heading residual.
    pub heading_reg_loss: Tensor,
    /// Size cluster cross entropy.
    pub size_cls_loss: Tensor,
    /// Huber loss of the normalized size residual, averaged over the three axes.
    pub size_reg_loss: Tensor,
    /// Semantic class cross entropy.
    pub sem_cls_loss: Tensor,
}

/// Box and semantic losses of the positive proposals.
///
/// # Arguments
///
/// * `detections` - Decoded detections.
/// * `gt` - Padded ground truth.
/// * `objectness_label` - `1.0` for positive proposals `(B, K)`.
/// * `object_assignment` - Ground truth box of every proposal `(B, K)`, `u32`.
/// * `mean_size` - Mean size of every size cluster `(NS, 3)`.
/// * `padding_penalty` - Distance added to padded boxes in the centroid lookup.
pub fn box_and_sem_cls_loss(
    detections: &Detections,
    gt: &GroundTruth,
    objectness_label: &Tensor,
    object_assignment: &Tensor,
    mean_size: &Tensor,
    padding_penalty: f64,
) -> Result<BoxLosses> {
    let num_heading_bin = detections.heading_scores.dim(D::Minus1)?;
    let (b, k) = object_assignment.dims2()?;

    // center
    let nn = nn_distance_masked(
        &detections.center,
        &gt.center_label,
        &gt.box_label_mask,
        padding_penalty,
        DistanceMode::L2Squared,
    )?;
    let centroid_reg_loss1 = masked_mean(&nn.dist1, objectness_label)?;
    let centroid_reg_loss2 = masked_mean(&nn.dist2, &gt.box_label_mask)?;
    let center_loss = (&centroid_reg_loss1 + &centroid_reg_loss2)?;

    // heading
    let heading_class_label = gather_rows(&gt.heading_class_label, object_assignment)?;
    let heading_cls_loss = masked_mean(
        &cross_entropy(&detections.heading_scores, &heading_class_label, None)?,
        objectness_label,
    )?;

    let heading_residual_label = (gather_rows(&gt.heading_residual_label, object_assignment)?
        / (PI / num_heading_bin as f64))?;
    let heading_residual_pred = detections
        .heading_residuals_normalized
        .contiguous()?
        .gather(&heading_class_label.unsqueeze(2)?.contiguous()?, 2)?
        .squeeze(2)?;
    let heading_reg_loss = masked_mean(
        &huber_loss(&(heading_residual_pred - heading_residual_label)?, 1.0)?,
        objectness_label,
    )?;

    // size
    let size_class_label = gather_rows(&gt.size_class_label, object_assignment)?;
    let size_cls_loss = masked_mean(
        &cross_entropy(&detections.size_scores, &size_class_label, None)?,
        objectness_label,
    )?;

    let size_residual_label = gather_rows3(&gt.size_residual_label, object_assignment)?;
    let mean_size_label = mean_size
        .index_select(&size_class_label.flatten_all()?, 0)?
        .reshape((b, k, 3))?;
    let size_residual_label = (size_residual_label / mean_size_label)?;
    let size_idx = size_class_label
        .reshape((b, k, 1, 1))?
        .broadcast_as((b, k, 1, 3))?
        .contiguous()?;
    let size_residual_pred = detections
        .size_residuals_normalized
        .contiguous()?
        .gather(&size_idx, 2)?
        .squeeze(2)?;
    let size_reg_loss = masked_mean(
        &huber_loss(&(size_residual_pred - size_residual_label)?, 1.0)?.mean(D::Minus1)?,
        objectness_label,
    )?;

    // semantics
    let sem_cls_label = gather_rows(&gt.sem_cls_label, object_assignment)?;
    let sem_cls_loss = masked_mean(
        &cross_entropy(&detections.sem_cls_scores, &sem_cls_label, None)?,
        objectness_label,
    )?;

    Ok(BoxLosses {
        centroid_reg_loss1,
        centroid_reg_loss2,
        center_loss,
        heading_cls_loss,
        heading_reg_loss,
        size_cls_loss,
        size_reg_loss,
        sem_cls_loss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    const NH: usize = 4;
    const NS: usize = 2;
    const NC: usize = 3;

    fn detections(center: Tensor) -> Result<Detections> {
        let (b, k, _) = center.dims3()?;
        let device = center.device().clone();
        let zeros = |shape: &[usize]| Tensor::zeros(shape, DType::F32, &device);
        Ok(Detections {
            aggregated_xyz: center.clone(),
            aggregated_inds: Tensor::zeros((b, k), DType::U32, &device)?,
            aggregated_features: zeros(&[b, 4, k])?,
            objectness_scores: zeros(&[b, k, 2])?,
            center,
            heading_scores: zeros(&[b, k, NH])?,
            heading_residuals_normalized: zeros(&[b, k, NH])?,
            heading_residuals: zeros(&[b, k, NH])?,
            size_scores: zeros(&[b, k, NS])?,
            size_residuals_normalized: zeros(&[b, k, NS, 3])?,
            size_residuals: zeros(&[b, k, NS, 3])?,
            sem_cls_scores: zeros(&[b, k, NC])?,
        })
    }

    fn ground_truth(center_label: Tensor, box_label_mask: Tensor) -> Result<GroundTruth> {
        let (b, k2, _) = center_label.dims3()?;
        let device = center_label.device().clone();
        Ok(GroundTruth {
            vote_label: Tensor::zeros((b, 1, 9), DType::F32, &device)?,
            vote_label_mask: Tensor::zeros((b, 1), DType::F32, &device)?,
            center_label,
            heading_class_label: Tensor::ones((b, k2), DType::U32, &device)?,
            heading_residual_label: Tensor::full(0.2f32, (b, k2), &device)?,
            size_class_label: Tensor::ones((b, k2), DType::U32, &device)?,
            size_residual_label: Tensor::new(&[0.2f32, 0.4, 0.6], &device)?
                .reshape((1, 1, 3))?
                .broadcast_as((b, k2, 3))?
                .contiguous()?,
            sem_cls_label: Tensor::zeros((b, k2), DType::U32, &device)?,
            box_label_mask,
            vote_label_corner: None,
            plane_label_mask: None,
            plane_votes: None,
            point_sem_cls_label: None,
            vox_center: None,
            vox_corner: None,
        })
    }

    fn mean_size(device: &Device) -> Result<Tensor> {
        Tensor::new(&[[1f32, 2., 3.], [2., 2., 2.]], device)
    }

    #[test]
    fn test_no_ground_truth_is_zero() -> Result<()> {
        let device = Device::Cpu;
        let det = detections(Tensor::rand(0f32, 1., (1, 2, 3), &device)?)?;
        let gt = ground_truth(
            Tensor::rand(0f32, 1., (1, 2, 3), &device)?,
            Tensor::zeros((1, 2), DType::F32, &device)?,
        )?;
        let label = Tensor::zeros((1, 2), DType::F32, &device)?;
        let assignment = Tensor::zeros((1, 2), DType::U32, &device)?;

        let losses = box_and_sem_cls_loss(&det, &gt, &label, &assignment, &mean_size(&device)?, 1e8)?;
        assert_eq!(losses.centroid_reg_loss2.to_scalar::<f32>()?, 0.0);
        assert_eq!(losses.center_loss.to_scalar::<f32>()?, 0.0);
        assert_eq!(losses.sem_cls_loss.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_empty_element_does_not_change_centroid_loss() -> Result<()> {
        let device = Device::Cpu;
        let pred = Tensor::new(&[[[0f32, 0., 0.], [1., 0., 0.]]], &device)?;
        let gt_center = Tensor::new(&[[[0f32, 0.5, 0.], [3., 3., 3.]]], &device)?;
        let gt_mask = Tensor::new(&[[1f32, 0.]], &device)?;
        let label = Tensor::zeros((1, 2), DType::F32, &device)?;
        let assignment = Tensor::zeros((1, 2), DType::U32, &device)?;

        let single = box_and_sem_cls_loss(
            &detections(pred.clone())?,
            &ground_truth(gt_center.clone(), gt_mask.clone())?,
            &label,
            &assignment,
            &mean_size(&device)?,
            1e8,
        )?;
        assert_relative_eq!(
            single.centroid_reg_loss2.to_scalar::<f32>()?,
            0.25,
            epsilon = 1e-5
        );

        let batched = box_and_sem_cls_loss(
            &detections(Tensor::cat(&[&pred, &pred], 0)?)?,
            &ground_truth(
                Tensor::cat(&[&gt_center, &gt_center], 0)?,
                Tensor::cat(&[&gt_mask, &gt_mask.zeros_like()?], 0)?,
            )?,
            &Tensor::cat(&[&label, &label], 0)?,
            &Tensor::cat(&[&assignment, &assignment], 0)?,
            &mean_size(&device)?,
            1e8,
        )?;
        let loss2 = batched.centroid_reg_loss2.to_scalar::<f32>()?;
        assert!(loss2.is_finite());
        assert_relative_eq!(loss2, 0.25, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_exact_residuals() -> Result<()> {
        let device = Device::Cpu;
        let center = Tensor::new(&[[[0f32, 0., 0.]]], &device)?;
        let mut det = detections(center.clone())?;

        let heading = (0.2 / (PI / NH as f64)) as f32;
        det.heading_residuals_normalized =
            Tensor::new(&[[[0f32, heading, 0., 0.]]], &device)?;
        det.size_residuals_normalized = Tensor::new(
            &[[[[0f32, 0., 0.], [0.1, 0.2, 0.3]]]],
            &device,
        )?;

        let gt = ground_truth(center, Tensor::ones((1, 1), DType::F32, &device)?)?;
        let label = Tensor::ones((1, 1), DType::F32, &device)?;
        let assignment = Tensor::zeros((1, 1), DType::U32, &device)?;

        let losses = box_and_sem_cls_loss(&det, &gt, &label, &assignment, &mean_size(&device)?, 1e8)?;
        assert_relative_eq!(losses.center_loss.to_scalar::<f32>()?, 0.0, epsilon = 1e-6);
        assert_relative_eq!(losses.heading_reg_loss.to_scalar::<f32>()?, 0.0, epsilon = 1e-6);
        assert_relative_eq!(losses.size_reg_loss.to_scalar::<f32>()?, 0.0, epsilon = 1e-6);

        // uniform logits
        let heading_cls = losses.heading_cls_loss.to_scalar::<f32>()?;
        assert_relative_eq!(heading_cls, (NH as f32).ln(), epsilon = 1e-5);
        Ok(())
    }
}
