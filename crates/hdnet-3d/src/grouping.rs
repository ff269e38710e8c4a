use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use crate::error::PointOpsError;

/// Find, for every query center, the neighbours of a point set inside a ball.
///
/// For each center the first `num_neighbors` point indices (in ascending index order) whose
/// squared distance to the center is strictly below `radius²` are returned. If fewer are found
/// the remaining slots repeat the first hit, and a center with no hit at all is filled with
/// index 0.
///
/// # Arguments
///
/// * `points` - The point set to search.
/// * `centers` - The query centers.
/// * `radius` - The ball radius.
/// * `num_neighbors` - The fixed number of neighbours to return per center.
///
/// # Returns
///
/// A flat vector of shape `[centers.len(), num_neighbors]` with indices into `points`.
///
/// Example:
/// ```
/// use hdnet_3d::grouping::ball_query;
///
/// let points = [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [3.0, 0.0, 0.0]];
/// let inds = ball_query(&points, &[[0.0, 0.0, 0.0]], 0.5, 4).unwrap();
/// assert_eq!(inds, vec![0, 1, 0, 0]);
/// ```
pub fn ball_query(
    points: &[[f32; 3]],
    centers: &[[f32; 3]],
    radius: f32,
    num_neighbors: usize,
) -> Result<Vec<u32>, PointOpsError> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(PointOpsError::InvalidRadius(radius));
    }

    if points.is_empty() {
        return Err(PointOpsError::EmptyPointSet);
    }

    let radius_sq = radius * radius;

    // build kdtree over the searched points to speed up the range search
    let kdtree: ImmutableKdTree<f32, u32, 3, 32> = ImmutableKdTree::new_from_slice(points);

    let mut neighbors = Vec::with_capacity(centers.len() * num_neighbors);
    for center in centers {
        let mut hits = kdtree
            .within_unsorted::<SquaredEuclidean>(center, radius_sq)
            .into_iter()
            .filter(|nn| nn.distance < radius_sq)
            .map(|nn| nn.item)
            .collect::<Vec<_>>();

        hits.sort_unstable();
        hits.truncate(num_neighbors);

        let pad = hits.first().copied().unwrap_or(0);
        hits.resize(num_neighbors, pad);

        neighbors.extend_from_slice(&hits);
    }

    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
        (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
    }

    #[test]
    fn test_ball_query_within_radius() -> Result<(), PointOpsError> {
        let points = (0..200)
            .map(|i| {
                let t = i as f32;
                [(t * 0.13).sin(), (t * 0.29).cos(), (t * 0.07).sin()]
            })
            .collect::<Vec<_>>();
        let centers = [points[3], points[50], points[199]];

        let radius = 0.4;
        let inds = ball_query(&points, &centers, radius, 8)?;
        assert_eq!(inds.len(), 3 * 8);

        for (center, group) in centers.iter().zip(inds.chunks_exact(8)) {
            for &i in group {
                assert!(squared_distance(&points[i as usize], center) < radius * radius);
            }
            // groups come in ascending index order, padded with the first hit
            let first = group[0];
            assert!(group.iter().all(|&i| i >= first));
        }

        Ok(())
    }

    #[test]
    fn test_ball_query_padding() -> Result<(), PointOpsError> {
        let points = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.1, 0.0, 0.0]];

        let inds = ball_query(&points, &[[10.0, 0.0, 0.0], [-50.0, 0.0, 0.0]], 0.5, 3)?;

        assert_eq!(inds, vec![1, 2, 1, 0, 0, 0]);

        Ok(())
    }

    #[test]
    fn test_ball_query_invalid_radius() {
        let points = [[0.0, 0.0, 0.0]];
        assert!(matches!(
            ball_query(&points, &points, 0.0, 1),
            Err(PointOpsError::InvalidRadius(_))
        ));
    }
}
