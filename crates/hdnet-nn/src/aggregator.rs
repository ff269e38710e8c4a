use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::{error::HdNetError, layers::Conv1dBnRelu};

/// Fuses the seed features of the four backbone towers into one descriptor per seed.
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    channels: usize,
    conv1: Conv1dBnRelu,
    conv2: Conv1dBnRelu,
}

impl FeatureAggregator {
    /// Create the aggregator for towers of `channels` features.
    pub fn new(channels: usize, vb: VarBuilder) -> Result<Self, HdNetError> {
        Ok(Self {
            channels,
            conv1: Conv1dBnRelu::new(4 * channels, 2 * channels, vb.pp("conv1"))?,
            conv2: Conv1dBnRelu::new(2 * channels, channels, vb.pp("conv2"))?,
        })
    }

    /// Concatenate the four `(B, C, N)` tower features and compress them to `(B, C, N)`.
    ///
    /// # Errors
    ///
    /// Returns [`HdNetError::ShapeMismatch`] when a tower does not produce `(B, C, N)` with the
    /// same `B` and `N` as the first one.
    pub fn forward_t(&self, towers: [&Tensor; 4], train: bool) -> Result<Tensor, HdNetError> {
        let (b, _, n) = towers[0].dims3()?;
        let expected = vec![b, self.channels, n];
        for tower in towers.iter() {
            if tower.dims() != expected.as_slice() {
                return Err(HdNetError::ShapeMismatch {
                    context: "feature_aggregator",
                    expected,
                    actual: tower.dims().to_vec(),
                });
            }
        }

        let xs = Tensor::cat(&towers, 1)?;
        Ok(xs
            .apply_t(&self.conv1, train)?
            .apply_t(&self.conv2, train)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_aggregator_shape() -> Result<(), HdNetError> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let agg = FeatureAggregator::new(8, vb)?;
        let towers = (0..4)
            .map(|_| Tensor::randn(0f32, 1., (2, 8, 10), &device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let out = agg.forward_t([&towers[0], &towers[1], &towers[2], &towers[3]], true)?;
        assert_eq!(out.dims(), &[2, 8, 10]);
        Ok(())
    }

    #[test]
    fn test_aggregator_rejects_mismatched_towers() -> Result<(), HdNetError> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let agg = FeatureAggregator::new(8, vb)?;
        let ok = Tensor::zeros((2, 8, 10), DType::F32, &device)?;
        let bad = Tensor::zeros((2, 8, 12), DType::F32, &device)?;

        let res = agg.forward_t([&ok, &ok, &bad, &ok], false);
        assert!(matches!(
            res,
            Err(HdNetError::ShapeMismatch { actual, .. }) if actual == vec![2, 8, 12]
        ));
        Ok(())
    }
}
