use candle_core::Tensor;
use candle_nn::{Conv1d, Module, VarBuilder};

use crate::{
    end_points::{PlaneParams, PlanePredictions},
    error::HdNetError,
    layers::{pointwise_conv1d, Conv1dBnRelu},
    ops::l2_normalize,
    primitive::Plane,
};

/// Regresses, per seed and vote, the six bounding planes of the enclosing object.
///
/// Each plane is a unit normal and an offset, `n . x + d = 0`.
#[derive(Debug, Clone)]
pub struct PlaneHead {
    vote_factor: usize,
    conv1: Conv1dBnRelu,
    conv2: Conv1dBnRelu,
    conv3: Conv1d,
}

impl PlaneHead {
    /// Create the head over seeds with `channels` features.
    pub fn new(vote_factor: usize, channels: usize, vb: VarBuilder) -> Result<Self, HdNetError> {
        Ok(Self {
            vote_factor,
            conv1: Conv1dBnRelu::new(channels, channels, vb.pp("conv1"))?,
            conv2: Conv1dBnRelu::new(channels, channels, vb.pp("conv2"))?,
            conv3: pointwise_conv1d(channels, Plane::ALL.len() * 4 * vote_factor, vb.pp("conv3"))?,
        })
    }

    /// Predict the planes from the `(B, C, N)` seed descriptor.
    pub fn forward_t(&self, features: &Tensor, train: bool) -> Result<PlanePredictions, HdNetError> {
        let (b, _, n) = features.dims3()?;
        let f = self.vote_factor;

        let net = features
            .apply_t(&self.conv1, train)?
            .apply_t(&self.conv2, train)?;
        let net = self
            .conv3
            .forward(&net)?
            .transpose(1, 2)?
            .reshape((b, n * f, Plane::ALL.len(), 4))?;

        let params = |plane: Plane| -> Result<PlaneParams, HdNetError> {
            let p = net.narrow(2, plane.index(), 1)?.squeeze(2)?;
            Ok(PlaneParams {
                rot: l2_normalize(&p.narrow(2, 0, 3)?.contiguous()?, 2)?,
                off: p.narrow(2, 3, 1)?.squeeze(2)?.contiguous()?,
            })
        };

        Ok(PlanePredictions {
            planes: [
                params(Plane::Upper)?,
                params(Plane::Lower)?,
                params(Plane::Left)?,
                params(Plane::Right)?,
                params(Plane::Front)?,
                params(Plane::Back)?,
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_plane_head() -> Result<(), HdNetError> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let head = PlaneHead::new(2, 8, vb)?;
        let features = Tensor::randn(0f32, 1., (2, 8, 5), &device)?;
        let planes = head.forward_t(&features, true)?;

        for plane in Plane::ALL {
            let params = planes.get(plane);
            assert_eq!(params.rot.dims(), &[2, 10, 3]);
            assert_eq!(params.off.dims(), &[2, 10]);

            let norms = params.rot.sqr()?.sum(2)?.sqrt()?.flatten_all()?.to_vec1::<f32>()?;
            for norm in norms {
                assert_relative_eq!(norm, 1.0, epsilon = 1e-4);
            }
        }
        Ok(())
    }
}
