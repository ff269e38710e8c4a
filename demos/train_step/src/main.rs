use argh::FromArgs;
use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use hdnet::{
    loss::{GroundTruth, LossAggregator, LossConfig},
    nn::{DatasetConfig, HdNet, HdNetConfig},
};

/// Runs a few optimization steps of the detector on a synthetic scene
#[derive(Debug, FromArgs)]
struct Args {
    /// dataset name, sunrgbd or scannet
    #[argh(option, short = 'd', default = "String::from(\"sunrgbd\")")]
    dataset: String,

    /// optional JSON file with the network configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// number of points per scene
    #[argh(option, short = 'p', default = "4096")]
    num_points: usize,

    /// number of optimization steps
    #[argh(option, short = 's', default = "5")]
    steps: usize,

    /// learning rate
    #[argh(option, default = "1e-3")]
    lr: f64,
}

/// A scene with one box at the origin enclosing the points of the lower half-space.
fn synthetic_scene(
    num_points: usize,
    dataset: &DatasetConfig,
    device: &Device,
) -> candle_core::Result<(Tensor, GroundTruth)> {
    let point_clouds = Tensor::rand(-1f32, 1., (1, num_points, 3), device)?;

    let xyz = point_clouds.squeeze(0)?;
    let z = xyz.narrow(1, 2, 1)?.squeeze(1)?;
    let vote_label_mask = z.lt(&z.zeros_like()?)?.to_dtype(DType::F32)?.unsqueeze(0)?;
    // offsets from every point to the origin, repeated for the three vote slots
    let vote_label = xyz.neg()?.repeat((1, 3))?.unsqueeze(0)?;

    let k2 = 2;
    let size_class = (dataset.num_size_cluster - 1) as u32;
    let gt = GroundTruth {
        vote_label,
        vote_label_mask,
        center_label: Tensor::zeros((1, k2, 3), DType::F32, device)?,
        heading_class_label: Tensor::zeros((1, k2), DType::U32, device)?,
        heading_residual_label: Tensor::zeros((1, k2), DType::F32, device)?,
        size_class_label: Tensor::new(&[[size_class, 0]], device)?,
        size_residual_label: Tensor::zeros((1, k2, 3), DType::F32, device)?,
        sem_cls_label: Tensor::new(&[[size_class, 0]], device)?,
        box_label_mask: Tensor::new(&[[1f32, 0.]], device)?,
        vote_label_corner: None,
        plane_label_mask: None,
        plane_votes: None,
        point_sem_cls_label: None,
        vox_center: None,
        vox_corner: None,
    };
    Ok((point_clouds, gt))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let dataset = DatasetConfig::from_name(&args.dataset)?;
    let config = match &args.config {
        Some(path) => serde_json::from_reader(std::fs::File::open(path)?)?,
        None => HdNetConfig {
            num_seed: 512,
            seed_feature_dim: 64,
            backbone_mlp: vec![32, 64],
            num_proposal: 64,
            proposal_feature_dim: 64,
            ..Default::default()
        },
    };

    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let net = HdNet::new(config, &dataset, vb)?;
    let aggregator = LossAggregator::new(dataset.clone(), LossConfig::default())?;

    let mut opt = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: args.lr,
            ..Default::default()
        },
    )?;

    let (point_clouds, gt) = synthetic_scene(args.num_points, &dataset, &device)?;
    for step in 0..args.steps {
        let ep = net.forward_t(&point_clouds, true)?;
        let out = aggregator.compute(&ep, &gt)?;
        opt.backward_step(&out.loss)?;

        for (name, value) in out.scalars()? {
            log::info!("step {step} {name}: {value:.4}");
        }
        println!("step {step}: loss {:.4}", out.loss.to_scalar::<f32>()?);
    }

    Ok(())
}
