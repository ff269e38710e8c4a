use candle_core::{DType, Tensor, D};
use hdnet_nn::{
    end_points::EndPoints,
    DatasetConfig, Plane,
};

use crate::{
    box_loss::{box_and_sem_cls_loss, BoxLosses},
    config::LossConfig,
    error::LossError,
    labels::GroundTruth,
    objectness::{objectness_loss, ObjectnessParams},
    plane::{center_plane_loss, corner_plane_loss, plane_loss, PlaneLoss},
    semantic::seed_semantic_loss,
    vote::vote_loss,
    voxel::voxel_loss,
};

/// Terms of the object cue group.
#[derive(Debug, Clone)]
pub struct ObjectCueLosses {
    /// Weighted center vote loss.
    pub vote_loss_center: Tensor,
    /// Weighted corner (edge vote) loss.
    pub vote_loss_corner: Tensor,
    /// Weighted seed semantic loss.
    pub sem_loss: Tensor,
    /// Center occupancy loss.
    pub voxel_loss_center: Tensor,
    /// Corner occupancy loss.
    pub voxel_loss_corner: Tensor,
    /// Weighted sum of the two occupancy losses.
    pub voxel_loss: Tensor,
    /// Contribution of the group to the total.
    pub total: Tensor,
}

/// Terms of the bounding plane group.
#[derive(Debug, Clone)]
pub struct PlaneLosses {
    /// Loss of every plane in [`Plane::ALL`] order.
    pub planes: [PlaneLoss; 6],
    /// Weighted sum of the six plane losses.
    pub loss_plane: Tensor,
    /// Weighted corner-on-plane consistency loss.
    pub loss_plane_corner: Tensor,
    /// Weighted center-between-planes consistency loss.
    pub loss_plane_center: Tensor,
    /// Contribution of the group to the total.
    pub total: Tensor,
}

impl PlaneLosses {
    /// The loss of one plane.
    pub fn get(&self, plane: Plane) -> &PlaneLoss {
        &self.planes[plane.index()]
    }
}

/// Every term computed by [`LossAggregator::compute`].
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Weighted proposal vote loss.
    pub vote_loss: Tensor,
    /// Objectness loss.
    pub objectness_loss: Tensor,
    /// `1.0` for positive proposals `(B, K)`.
    pub objectness_label: Tensor,
    /// `0.0` for proposals in the dead zone `(B, K)`.
    pub objectness_mask: Tensor,
    /// Ground truth box of every proposal `(B, K)`, `u32`.
    pub object_assignment: Tensor,
    /// Box and semantic terms.
    pub box_losses: BoxLosses,
    /// Weighted sum of the box terms.
    pub box_loss: Tensor,
    /// Weighted proposal loss.
    pub init_proposal_loss: Tensor,
    /// Object cue terms, when enabled.
    pub objcue: Option<ObjectCueLosses>,
    /// Plane terms, when enabled.
    pub plane: Option<PlaneLosses>,
    /// Share of positive proposals.
    pub pos_ratio: f32,
    /// Share of negative proposals.
    pub neg_ratio: f32,
    /// Objectness accuracy over the unmasked proposals.
    pub obj_acc: f32,
    /// The scalar to minimize.
    pub loss: Tensor,
}

impl LossOutput {
    /// Named scalar values of the main terms, for logging.
    pub fn scalars(&self) -> candle_core::Result<Vec<(&'static str, f32)>> {
        let mut terms: Vec<(&'static str, &Tensor)> = vec![
            ("loss", &self.loss),
            ("vote_loss", &self.vote_loss),
            ("objectness_loss", &self.objectness_loss),
            ("center_loss", &self.box_losses.center_loss),
            ("heading_cls_loss", &self.box_losses.heading_cls_loss),
            ("heading_reg_loss", &self.box_losses.heading_reg_loss),
            ("size_cls_loss", &self.box_losses.size_cls_loss),
            ("size_reg_loss", &self.box_losses.size_reg_loss),
            ("sem_cls_loss", &self.box_losses.sem_cls_loss),
            ("box_loss", &self.box_loss),
        ];
        if let Some(objcue) = &self.objcue {
            terms.extend([
                ("vote_loss_center", &objcue.vote_loss_center),
                ("vote_loss_corner", &objcue.vote_loss_corner),
                ("sem_loss", &objcue.sem_loss),
                ("voxel_loss", &objcue.voxel_loss),
            ]);
        }
        if let Some(plane) = &self.plane {
            terms.extend([
                ("loss_plane", &plane.loss_plane),
                ("loss_plane_corner", &plane.loss_plane_corner),
                ("loss_plane_center", &plane.loss_plane_center),
            ]);
        }

        let mut values = terms
            .into_iter()
            .map(|(name, t)| Ok((name, t.to_dtype(DType::F32)?.to_scalar::<f32>()?)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        values.extend([
            ("pos_ratio", self.pos_ratio),
            ("neg_ratio", self.neg_ratio),
            ("obj_acc", self.obj_acc),
        ]);
        Ok(values)
    }
}

/// Combines every loss term of a forward pass into one scalar.
#[derive(Debug, Clone)]
pub struct LossAggregator {
    dataset: DatasetConfig,
    config: LossConfig,
}

impl LossAggregator {
    /// Create the aggregator.
    ///
    /// # Errors
    ///
    /// Fails when the dataset mean size table does not match its size clusters.
    pub fn new(dataset: DatasetConfig, config: LossConfig) -> Result<Self, LossError> {
        dataset.validate()?;
        Ok(Self { dataset, config })
    }

    /// The loss options.
    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Compute every enabled term and the total.
    ///
    /// # Errors
    ///
    /// Returns [`LossError::MissingInput`] when an enabled group lacks a prediction or a target,
    /// and a tensor error when a prediction and its target disagree in shape.
    pub fn compute(&self, ep: &EndPoints, gt: &GroundTruth) -> Result<LossOutput, LossError> {
        let w = &self.config.weights;
        let device = ep.detections.center.device();
        self.check_vote_targets("vote_label", &gt.vote_label)?;

        // proposal group
        let vote = (vote_loss(
            &ep.seeds,
            &ep.votes.center.xyz,
            &gt.vote_label,
            &gt.vote_label_mask,
        )? * w.vote)?;

        let class_weights = Tensor::new(&self.config.objectness_cls_weights, device)?
            .to_dtype(ep.detections.objectness_scores.dtype())?;
        let objectness = objectness_loss(
            &ep.detections.aggregated_xyz,
            &ep.detections.objectness_scores,
            &gt.center_label,
            &gt.box_label_mask,
            &ObjectnessParams {
                near_threshold: self.config.near_threshold,
                far_threshold: self.config.far_threshold,
                class_weights: &class_weights,
                padding_penalty: self.config.padding_penalty,
            },
        )?;

        let box_losses = box_and_sem_cls_loss(
            &ep.detections,
            gt,
            &objectness.label,
            &objectness.object_assignment,
            &self.dataset.mean_size_tensor(device)?,
            self.config.padding_penalty,
        )?;
        let box_loss = weighted_sum(
            (&box_losses.center_loss, w.center),
            &[
                (&box_losses.heading_cls_loss, w.heading_cls),
                (&box_losses.heading_reg_loss, w.heading_reg),
                (&box_losses.size_cls_loss, w.size_cls),
                (&box_losses.size_reg_loss, w.size_reg),
            ],
        )?;
        let init_proposal_loss = (weighted_sum(
            (&vote, 1.0),
            &[
                (&objectness.loss, w.objectness),
                (&box_loss, 1.0),
                (&box_losses.sem_cls_loss, w.sem_cls),
            ],
        )? * w.proposal)?;

        let objcue = if self.config.use_objcue {
            Some(self.objcue_losses(ep, gt)?)
        } else {
            None
        };
        let plane = if self.config.use_plane {
            Some(self.plane_losses(ep, gt)?)
        } else {
            None
        };

        let mut loss = init_proposal_loss.clone();
        if let Some(objcue) = &objcue {
            loss = (loss + &objcue.total)?;
        }
        if let Some(plane) = &plane {
            loss = (loss + &plane.total)?;
        }

        let (pos_ratio, neg_ratio) = ratios(&objectness.label, &objectness.mask)?;
        let obj_acc = objectness_accuracy(
            &ep.detections.objectness_scores,
            &objectness.label,
            &objectness.mask,
        )?;

        log::debug!("pos_ratio {pos_ratio:.3}, neg_ratio {neg_ratio:.3}, obj_acc {obj_acc:.3}");

        Ok(LossOutput {
            vote_loss: vote,
            objectness_loss: objectness.loss,
            objectness_label: objectness.label,
            objectness_mask: objectness.mask,
            object_assignment: objectness.object_assignment,
            box_losses,
            box_loss,
            init_proposal_loss,
            objcue,
            plane,
            pos_ratio,
            neg_ratio,
            obj_acc,
            loss,
        })
    }

    fn check_vote_targets(&self, name: &'static str, targets: &Tensor) -> Result<(), LossError> {
        let expected = 3 * self.config.gt_vote_factor;
        let actual = targets.dim(2)?;
        if actual != expected {
            return Err(LossError::TargetShape {
                name,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn objcue_losses(&self, ep: &EndPoints, gt: &GroundTruth) -> Result<ObjectCueLosses, LossError> {
        let w = &self.config.weights;
        let vote_label_corner = gt
            .vote_label_corner
            .as_ref()
            .ok_or(LossError::MissingInput("vote_label_corner"))?;
        self.check_vote_targets("vote_label_corner", vote_label_corner)?;
        let point_sem_cls_label = gt
            .point_sem_cls_label
            .as_ref()
            .ok_or(LossError::MissingInput("point_sem_cls_label"))?;
        let vox_center = gt
            .vox_center
            .as_ref()
            .ok_or(LossError::MissingInput("vox_center"))?;
        let vox_corner = gt
            .vox_corner
            .as_ref()
            .ok_or(LossError::MissingInput("vox_corner"))?;
        let semantics = ep
            .seed_semantics
            .as_ref()
            .ok_or(LossError::MissingInput("seed_semantics"))?;
        let voxels = ep.voxels.as_ref().ok_or(LossError::MissingInput("voxels"))?;

        let vote_loss_center = (vote_loss(
            &ep.seeds,
            &ep.votes.center.xyz,
            &gt.vote_label,
            &gt.vote_label_mask,
        )? * w.vote_center)?;
        let vote_loss_corner = (vote_loss(
            &ep.seeds,
            &ep.votes.edge.xyz,
            vote_label_corner,
            &gt.vote_label_mask,
        )? * w.vote_corner)?;
        let sem_loss = (seed_semantic_loss(
            &ep.seeds,
            semantics,
            point_sem_cls_label,
            &gt.vote_label_mask,
        )? * w.seed_sem)?;

        let voxel_loss_center = voxel_loss(&voxels.center, vox_center, &w.voxel_center_terms)?;
        let voxel_loss_corner = voxel_loss(&voxels.corner, vox_corner, &w.voxel_corner_terms)?;
        let voxel = weighted_sum(
            (&voxel_loss_center, w.voxel_center),
            &[(&voxel_loss_corner, w.voxel_corner)],
        )?;

        let total = weighted_sum(
            (&vote_loss_center, 1.0),
            &[
                (&vote_loss_corner, 1.0),
                (&sem_loss, 1.0),
                (&voxel, w.voxel),
            ],
        )?;

        Ok(ObjectCueLosses {
            vote_loss_center,
            vote_loss_corner,
            sem_loss,
            voxel_loss_center,
            voxel_loss_corner,
            voxel_loss: voxel,
            total,
        })
    }

    fn plane_losses(&self, ep: &EndPoints, gt: &GroundTruth) -> Result<PlaneLosses, LossError> {
        let w = &self.config.weights;
        let planes = ep
            .planes
            .as_ref()
            .ok_or(LossError::MissingInput("planes"))?;
        let plane_label_mask = gt
            .plane_label_mask
            .as_ref()
            .ok_or(LossError::MissingInput("plane_label_mask"))?;

        let mut losses = Vec::with_capacity(Plane::ALL.len());
        for plane in Plane::ALL {
            let targets = gt
                .plane(plane)
                .ok_or(LossError::MissingInput("plane_votes"))?;
            losses.push(plane_loss(
                &ep.seeds,
                planes.get(plane),
                targets,
                plane_label_mask,
            )?);
        }
        let planes_losses: [PlaneLoss; 6] = losses
            .try_into()
            .map_err(|_| LossError::MissingInput("plane_votes"))?;

        let rest = planes_losses[1..]
            .iter()
            .map(|l| (&l.total, 1.0))
            .collect::<Vec<_>>();
        let loss_plane = (weighted_sum((&planes_losses[0].total, 1.0), &rest)? * w.plane)?;

        let loss_plane_corner = (corner_plane_loss(
            &ep.seeds,
            planes,
            &ep.votes.edge.xyz,
            plane_label_mask,
        )? * w.plane_consistency)?;
        let loss_plane_center = (center_plane_loss(
            &ep.seeds,
            planes,
            &ep.votes.center.xyz,
            plane_label_mask,
        )? * w.plane_consistency)?;

        let total = weighted_sum(
            (&loss_plane, 1.0),
            &[
                (&loss_plane_corner, w.plane_consistency_in_total),
                (&loss_plane_center, w.plane_consistency_in_total),
            ],
        )?;

        Ok(PlaneLosses {
            planes: planes_losses,
            loss_plane,
            loss_plane_corner,
            loss_plane_center,
            total,
        })
    }
}

/// `sum(w_i * t_i)` of scalar tensors, on the device of `first`.
fn weighted_sum(
    first: (&Tensor, f64),
    rest: &[(&Tensor, f64)],
) -> candle_core::Result<Tensor> {
    let (t, w) = first;
    rest.iter()
        .try_fold((t * w)?, |acc, &(t, w)| acc + (t * w)?)
}

fn ratios(label: &Tensor, mask: &Tensor) -> candle_core::Result<(f32, f32)> {
    let total = label.elem_count() as f32;
    let positives = label.sum_all()?.to_dtype(DType::F32)?.to_scalar::<f32>()?;
    let unmasked = mask.sum_all()?.to_dtype(DType::F32)?.to_scalar::<f32>()?;
    let pos_ratio = positives / total;
    Ok((pos_ratio, unmasked / total - pos_ratio))
}

fn objectness_accuracy(scores: &Tensor, label: &Tensor, mask: &Tensor) -> candle_core::Result<f32> {
    let pred = scores.argmax(D::Minus1)?;
    let correct = pred
        .eq(&label.to_dtype(DType::U32)?)?
        .to_dtype(mask.dtype())?;
    let acc = ((correct * mask)?.sum_all()? / (mask.sum_all()? + 1e-6)?)?;
    acc.to_dtype(DType::F32)?.to_scalar::<f32>()
}
