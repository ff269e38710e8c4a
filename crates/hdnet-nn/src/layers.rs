use candle_core::{Result, Tensor};
use candle_nn::{
    batch_norm, conv1d, conv2d, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, Conv2d,
    Conv2dConfig, Module, ModuleT, VarBuilder,
};

/// Point-wise 1D convolution followed by batch norm and ReLU.
#[derive(Debug, Clone)]
pub struct Conv1dBnRelu {
    conv: Conv1d,
    bn: BatchNorm,
}

impl Conv1dBnRelu {
    /// Create the block mapping `in_channels` to `out_channels` features per point.
    pub fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            conv: pointwise_conv1d(in_channels, out_channels, vb.pp("conv"))?,
            bn: batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?,
        })
    }
}

impl ModuleT for Conv1dBnRelu {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        self.conv.forward(xs)?.apply_t(&self.bn, train)?.relu()
    }
}

/// A 1x1 2D convolution followed by batch norm and ReLU, applied to grouped points.
#[derive(Debug, Clone)]
pub struct Conv2dBnRelu {
    conv: Conv2d,
    bn: BatchNorm,
}

impl Conv2dBnRelu {
    /// Create the block mapping `in_channels` to `out_channels` features per grouped point.
    pub fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            conv: conv2d(
                in_channels,
                out_channels,
                1,
                Conv2dConfig::default(),
                vb.pp("conv"),
            )?,
            bn: batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?,
        })
    }
}

impl ModuleT for Conv2dBnRelu {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        self.conv.forward(xs)?.apply_t(&self.bn, train)?.relu()
    }
}

/// A stack of [`Conv2dBnRelu`] blocks shared across all grouped points.
#[derive(Debug, Clone)]
pub struct SharedMlp {
    layers: Vec<Conv2dBnRelu>,
    out_channels: usize,
}

impl SharedMlp {
    /// Create the stack; `widths[0]` is the input width and every following entry a layer.
    pub fn new(widths: &[usize], vb: VarBuilder) -> Result<Self> {
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| Conv2dBnRelu::new(w[0], w[1], vb.pp(format!("layer{i}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            out_channels: widths.last().copied().unwrap_or(0),
        })
    }

    /// Width of the last layer.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl ModuleT for SharedMlp {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        self.layers
            .iter()
            .try_fold(xs.clone(), |xs, layer| xs.apply_t(layer, train))
    }
}

/// A point-wise (kernel size 1) 1D convolution with bias.
pub fn pointwise_conv1d(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Conv1d> {
    conv1d(in_channels, out_channels, 1, Conv1dConfig::default(), vb)
}
