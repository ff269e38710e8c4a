use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::{
    aggregator::FeatureAggregator,
    backbone::{Backbone, PointNetBackbone},
    config::HdNetConfig,
    dataset::DatasetConfig,
    end_points::{EndPoints, PrimitiveSets, VoteSets},
    error::HdNetError,
    flags::BoundaryFlagHeads,
    plane::PlaneHead,
    primitive::PrimitiveType,
    proposal::PrimitiveModule,
    refine::{ProposalModuleRefine, ProposalRefiner},
    semantic::SeedSemanticHead,
    voting::VotingModule,
};

/// The hybrid voting detector.
///
/// Four backbone towers extract seed features that are fused into one descriptor per seed.
/// From it the network classifies boundary flags, casts center, z-face, xy-face and edge votes,
/// aggregates the boundary votes into primitive proposals and refines everything into boxes.
pub struct HdNet {
    config: HdNetConfig,
    backbones: [Box<dyn Backbone>; 4],
    aggregator: FeatureAggregator,
    flags: BoundaryFlagHeads,
    center_voting: VotingModule,
    z_voting: VotingModule,
    xy_voting: VotingModule,
    edge_voting: VotingModule,
    z_module: PrimitiveModule,
    xy_module: PrimitiveModule,
    edge_module: PrimitiveModule,
    refiner: Box<dyn ProposalRefiner>,
    plane_head: Option<PlaneHead>,
    semantic_head: Option<SeedSemanticHead>,
}

impl HdNet {
    /// Create the network with the default backbone and refinement stage.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate or a weight cannot be created.
    pub fn new(
        config: HdNetConfig,
        dataset: &DatasetConfig,
        vb: VarBuilder,
    ) -> Result<Self, HdNetError> {
        config.validate()?;
        dataset.validate()?;
        let c = config.seed_feature_dim;
        let f = config.vote_factor;

        let backbones: [Box<dyn Backbone>; 4] = [
            Box::new(PointNetBackbone::new(&config, vb.pp("backbone_net1"))?),
            Box::new(PointNetBackbone::new(&config, vb.pp("backbone_net2"))?),
            Box::new(PointNetBackbone::new(&config, vb.pp("backbone_net3"))?),
            Box::new(PointNetBackbone::new(&config, vb.pp("backbone_net4"))?),
        ];

        let plane_head = if config.with_planes {
            Some(PlaneHead::new(f, c, vb.pp("plane"))?)
        } else {
            None
        };
        let semantic_head = if config.with_object_cues {
            Some(SeedSemanticHead::new(
                c,
                config.flag_hidden_dim,
                dataset.num_class,
                vb.pp("sem"),
            )?)
        } else {
            None
        };

        log::debug!(
            "building network for {}: {} seeds, {} proposals, {} sampling",
            dataset.name,
            config.num_seed,
            config.num_proposal,
            config.sampling
        );

        Ok(Self {
            backbones,
            aggregator: FeatureAggregator::new(c, vb.pp("agg"))?,
            flags: BoundaryFlagHeads::new(c, config.flag_hidden_dim, vb.clone())?,
            center_voting: VotingModule::new(f, c, vb.pp("vgen"))?,
            z_voting: VotingModule::new(f, c, vb.pp("vgen_z"))?,
            xy_voting: VotingModule::new(f, c, vb.pp("vgen_xy"))?,
            edge_voting: VotingModule::new(f, c, vb.pp("vgen_line"))?,
            z_module: PrimitiveModule::new(
                PrimitiveType::ZFace,
                &config,
                dataset.num_class,
                vb.pp("pnet_z"),
            )?,
            xy_module: PrimitiveModule::new(
                PrimitiveType::XyFace,
                &config,
                dataset.num_class,
                vb.pp("pnet_xy"),
            )?,
            edge_module: PrimitiveModule::new(
                PrimitiveType::Edge,
                &config,
                dataset.num_class,
                vb.pp("pnet_line"),
            )?,
            refiner: Box::new(ProposalModuleRefine::new(
                &config,
                dataset,
                vb.pp("pnet_final"),
            )?),
            plane_head,
            semantic_head,
            config,
        })
    }

    /// Replace the four backbone towers.
    ///
    /// # Errors
    ///
    /// Returns [`HdNetError::InvalidConfig`] when a tower does not produce `seed_feature_dim`
    /// channels.
    pub fn with_backbones(mut self, backbones: [Box<dyn Backbone>; 4]) -> Result<Self, HdNetError> {
        if let Some(tower) = backbones
            .iter()
            .find(|b| b.out_channels() != self.config.seed_feature_dim)
        {
            return Err(HdNetError::InvalidConfig(format!(
                "backbone produces {} channels, expected {}",
                tower.out_channels(),
                self.config.seed_feature_dim
            )));
        }
        self.backbones = backbones;
        Ok(self)
    }

    /// Replace the refinement stage.
    pub fn with_refiner(mut self, refiner: Box<dyn ProposalRefiner>) -> Self {
        self.refiner = refiner;
        self
    }

    /// The network configuration.
    pub fn config(&self) -> &HdNetConfig {
        &self.config
    }

    /// Run the network on `(B, P, 3 + input_feature_dim)` point clouds.
    pub fn forward_t(&self, point_clouds: &Tensor, train: bool) -> Result<EndPoints, HdNetError> {
        let [net1, net2, net3, net4] = &self.backbones;
        let seeds = net1.forward_t(point_clouds, train)?;
        let towers = [
            net2.forward_t(point_clouds, train)?,
            net3.forward_t(point_clouds, train)?,
            net4.forward_t(point_clouds, train)?,
        ];

        let hd_feature = self.aggregator.forward_t(
            [
                &seeds.features,
                &towers[0].features,
                &towers[1].features,
                &towers[2].features,
            ],
            train,
        )?;

        let flags = self.flags.forward_t(&hd_feature, train)?;

        let votes = VoteSets {
            center: self.center_voting.forward_t(&seeds.xyz, &hd_feature, train)?,
            z_face: self.z_voting.forward_t(&seeds.xyz, &hd_feature, train)?,
            xy_face: self.xy_voting.forward_t(&seeds.xyz, &hd_feature, train)?,
            edge: self.edge_voting.forward_t(&seeds.xyz, &hd_feature, train)?,
        };

        let primitives = PrimitiveSets {
            z_face: self.z_module.forward_t(&votes.z_face, &seeds, train)?,
            xy_face: self.xy_module.forward_t(&votes.xy_face, &seeds, train)?,
            edge: self.edge_module.forward_t(&votes.edge, &seeds, train)?,
        };

        let detections = self
            .refiner
            .forward_t(&votes.center, &primitives, &seeds, train)?;

        let planes = self
            .plane_head
            .as_ref()
            .map(|head| head.forward_t(&hd_feature, train))
            .transpose()?;
        let seed_semantics = self
            .semantic_head
            .as_ref()
            .map(|head| head.forward_t(&hd_feature, train))
            .transpose()?;

        log::debug!(
            "forward pass: seeds {:?}, detections {:?}",
            seeds.xyz.dims(),
            detections.center.dims()
        );

        Ok(EndPoints {
            seeds,
            hd_feature,
            flags,
            votes,
            primitives,
            detections,
            planes,
            seed_semantics,
            voxels: None,
        })
    }
}
