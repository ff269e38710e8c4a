use candle_core::{DType, Tensor};
use hdnet_3d::{grouping, sampling};
use rand::Rng;

use crate::error::HdNetError;

/// Copy a `(B, N, 3)` tensor into one point list per batch element.
pub fn point_sets(xyz: &Tensor) -> Result<Vec<Vec<[f32; 3]>>, HdNetError> {
    let (_, _, c) = xyz.dims3()?;
    if c != 3 {
        return Err(HdNetError::ShapeMismatch {
            context: "point_sets",
            expected: vec![3],
            actual: vec![c],
        });
    }

    let xyz = xyz.to_dtype(DType::F32)?.to_vec3::<f32>()?;

    Ok(xyz
        .into_iter()
        .map(|set| set.into_iter().map(|p| [p[0], p[1], p[2]]).collect())
        .collect())
}

/// Batched farthest point sampling.
///
/// # Arguments
///
/// * `xyz` - Points `(B, N, 3)`.
/// * `num_samples` - Number of points to select per batch element.
///
/// # Returns
///
/// The selected indices `(B, num_samples)` as `u32`.
pub fn furthest_point_sample(xyz: &Tensor, num_samples: usize) -> Result<Tensor, HdNetError> {
    let sets = point_sets(xyz)?;

    let mut inds = Vec::with_capacity(sets.len() * num_samples);
    for set in sets.iter() {
        inds.extend(sampling::farthest_point_sample(set, num_samples)?);
    }

    Ok(Tensor::from_vec(
        inds,
        (sets.len(), num_samples),
        xyz.device(),
    )?)
}

/// Batched uniform random sampling with replacement, `(B, num_samples)` `u32` indices.
pub fn random_sample<R: Rng + ?Sized>(
    batch_size: usize,
    num_points: usize,
    num_samples: usize,
    rng: &mut R,
    device: &candle_core::Device,
) -> Result<Tensor, HdNetError> {
    let mut inds = Vec::with_capacity(batch_size * num_samples);
    for _ in 0..batch_size {
        inds.extend(sampling::random_sample(num_points, num_samples, rng)?);
    }

    Ok(Tensor::from_vec(inds, (batch_size, num_samples), device)?)
}

/// Batched ball query.
///
/// # Arguments
///
/// * `xyz` - Points to search `(B, N, 3)`.
/// * `new_xyz` - Query centers `(B, K, 3)`.
/// * `radius` - Ball radius.
/// * `nsample` - Neighbours per center.
///
/// # Returns
///
/// Neighbour indices into `xyz`, `(B, K, nsample)` as `u32`.
pub fn ball_query(
    xyz: &Tensor,
    new_xyz: &Tensor,
    radius: f32,
    nsample: usize,
) -> Result<Tensor, HdNetError> {
    let points = point_sets(xyz)?;
    let centers = point_sets(new_xyz)?;

    if points.len() != centers.len() {
        return Err(HdNetError::ShapeMismatch {
            context: "ball_query",
            expected: vec![points.len()],
            actual: vec![centers.len()],
        });
    }

    let num_centers = centers.first().map_or(0, |c| c.len());

    let mut inds = Vec::with_capacity(points.len() * num_centers * nsample);
    for (points, centers) in points.iter().zip(centers.iter()) {
        inds.extend(grouping::ball_query(points, centers, radius, nsample)?);
    }

    Ok(Tensor::from_vec(
        inds,
        (points.len(), num_centers, nsample),
        xyz.device(),
    )?)
}

/// Gather rows of a `(B, N, C)` tensor with `(B, K)` indices into `(B, K, C)`.
pub fn gather_points(xyz: &Tensor, inds: &Tensor) -> candle_core::Result<Tensor> {
    let (b, k) = inds.dims2()?;
    let c = xyz.dim(2)?;
    let idx = inds.unsqueeze(2)?.broadcast_as((b, k, c))?.contiguous()?;
    xyz.contiguous()?.gather(&idx, 1)
}

/// Gather columns of a `(B, C, N)` feature tensor with `(B, K, S)` indices into `(B, C, K, S)`.
pub fn group_features(features: &Tensor, idx: &Tensor) -> candle_core::Result<Tensor> {
    let (b, k, s) = idx.dims3()?;
    let c = features.dim(1)?;
    let flat = idx
        .reshape((b, 1, k * s))?
        .broadcast_as((b, c, k * s))?
        .contiguous()?;
    features
        .contiguous()?
        .gather(&flat, 2)?
        .reshape((b, c, k, s))
}

/// Scale vectors along `dim` to unit L2 norm.
pub fn l2_normalize(xs: &Tensor, dim: usize) -> candle_core::Result<Tensor> {
    let norm = xs.sqr()?.sum_keepdim(dim)?.sqrt()?;
    xs.broadcast_div(&(norm + 1e-12)?)
}
