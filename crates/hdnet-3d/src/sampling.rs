use glam::Vec3;
use rand::Rng;

use crate::error::PointOpsError;

/// Initial distance assigned to every point before the first update.
const FPS_INIT_DISTANCE: f32 = 1e10;

/// Select a spatially spread subset of points with farthest point sampling.
///
/// The sampling is greedy and deterministic: it starts from the first point and at every step
/// picks the point whose squared distance to the already selected set is the largest.
///
/// # Arguments
///
/// * `points` - The points to sample from.
/// * `num_samples` - The number of points to select.
///
/// # Returns
///
/// The indices of the selected points, in selection order.
///
/// Example:
/// ```
/// use hdnet_3d::sampling::farthest_point_sample;
///
/// let points = [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [5.0, 0.0, 0.0]];
/// let inds = farthest_point_sample(&points, 2).unwrap();
/// assert_eq!(inds, vec![0, 2]);
/// ```
pub fn farthest_point_sample(
    points: &[[f32; 3]],
    num_samples: usize,
) -> Result<Vec<u32>, PointOpsError> {
    if num_samples == 0 {
        return Ok(Vec::new());
    }

    if points.is_empty() {
        return Err(PointOpsError::EmptyPointSet);
    }

    if num_samples > points.len() {
        return Err(PointOpsError::NotEnoughPoints {
            requested: num_samples,
            available: points.len(),
        });
    }

    let points = points
        .iter()
        .map(|p| Vec3::from_array(*p))
        .collect::<Vec<_>>();
    let mut min_distances = vec![FPS_INIT_DISTANCE; points.len()];

    let mut indices = Vec::with_capacity(num_samples);
    let mut last = 0;
    indices.push(last as u32);

    for _ in 1..num_samples {
        let anchor = points[last];

        let mut farthest = 0;
        let mut farthest_distance = -1.0;
        for (i, (point, min_distance)) in points.iter().zip(min_distances.iter_mut()).enumerate() {
            let distance = point.distance_squared(anchor);
            if distance < *min_distance {
                *min_distance = distance;
            }
            if *min_distance > farthest_distance {
                farthest_distance = *min_distance;
                farthest = i;
            }
        }

        last = farthest;
        indices.push(last as u32);
    }

    Ok(indices)
}

/// Draw point indices uniformly at random, with replacement.
///
/// # Arguments
///
/// * `num_points` - The number of points in the set to draw from.
/// * `num_samples` - The number of indices to draw.
/// * `rng` - The random number generator. Seed it for reproducible draws.
pub fn random_sample<R: Rng + ?Sized>(
    num_points: usize,
    num_samples: usize,
    rng: &mut R,
) -> Result<Vec<u32>, PointOpsError> {
    if num_points == 0 {
        return Err(PointOpsError::EmptyPointSet);
    }

    Ok((0..num_samples)
        .map(|_| rng.random_range(0..num_points) as u32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_farthest_point_sample_order() -> Result<(), PointOpsError> {
        let points = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [5.0, 0.0, 0.0],
            [9.0, 0.0, 0.0],
        ];

        let inds = farthest_point_sample(&points, 3)?;

        // starts at the first point, then the farthest one, then the middle
        assert_eq!(inds, vec![0, 2, 3]);

        Ok(())
    }

    #[test]
    fn test_farthest_point_sample_distinct() -> Result<(), PointOpsError> {
        let points = (0..64)
            .map(|i| {
                let t = i as f32 * 0.37;
                [t.cos(), t.sin(), t * 0.1]
            })
            .collect::<Vec<_>>();

        let mut inds = farthest_point_sample(&points, 32)?;
        assert_eq!(inds.len(), 32);

        inds.sort_unstable();
        inds.dedup();
        assert_eq!(inds.len(), 32);

        Ok(())
    }

    #[test]
    fn test_farthest_point_sample_errors() {
        let points = [[0.0, 0.0, 0.0]];
        assert!(matches!(
            farthest_point_sample(&points, 2),
            Err(PointOpsError::NotEnoughPoints {
                requested: 2,
                available: 1
            })
        ));
        assert!(matches!(
            farthest_point_sample(&[], 1),
            Err(PointOpsError::EmptyPointSet)
        ));
        assert!(farthest_point_sample(&[], 0).is_ok_and(|inds| inds.is_empty()));
    }

    #[test]
    fn test_random_sample_seeded() -> Result<(), PointOpsError> {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);

        let a = random_sample(100, 16, &mut rng1)?;
        let b = random_sample(100, 16, &mut rng2)?;

        assert_eq!(a, b);
        assert!(a.iter().all(|&i| i < 100));

        assert!(random_sample(0, 4, &mut rng1).is_err());

        Ok(())
    }
}
