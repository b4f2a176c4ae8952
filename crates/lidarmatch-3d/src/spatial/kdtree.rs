use std::num::NonZeroUsize;
use std::sync::Arc;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use super::{check_available, Neighbor, SpatialIndex};
use crate::{ops::euclidean_distance, pointcloud::PointCloud, PointCloudError};

/// A k-d tree over the points of a shared cloud.
pub struct KdTree {
    cloud: Arc<PointCloud>,
    // kiddo cannot build over an empty slice
    tree: Option<ImmutableKdTree<f64, u64, 3, 32>>,
}

impl KdTree {
    /// Build the tree over `cloud`.
    pub fn new(cloud: Arc<PointCloud>) -> Self {
        let tree = match cloud.is_empty() {
            true => None,
            false => Some(ImmutableKdTree::new_from_slice(cloud.points())),
        };
        log::debug!("Built kd-tree over {} points", cloud.len());
        Self { cloud, tree }
    }

    // the `count` nearest points ranked by distance then index
    fn ranked(
        &self,
        tree: &ImmutableKdTree<f64, u64, 3, 32>,
        query: &[f64; 3],
        count: NonZeroUsize,
    ) -> Vec<Neighbor> {
        let points = self.cloud.points();
        let mut neighbors = tree
            .nearest_n::<SquaredEuclidean>(query, count)
            .into_iter()
            .map(|nn| {
                let index = nn.item as usize;
                Neighbor {
                    index,
                    distance: euclidean_distance(&points[index], query),
                }
            })
            .collect::<Vec<_>>();
        neighbors.sort_by(Neighbor::rank_cmp);
        neighbors
    }
}

impl std::fmt::Debug for KdTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdTree")
            .field("num_points", &self.cloud.len())
            .finish()
    }
}

impl SpatialIndex for KdTree {
    fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    fn nearest_neighbors(
        &self,
        query: &[f64; 3],
        k: usize,
    ) -> Result<Vec<Neighbor>, PointCloudError> {
        check_available(&self.cloud, k)?;
        let (Some(tree), Some(mut count)) = (&self.tree, NonZeroUsize::new(k)) else {
            return Ok(Vec::new());
        };

        // the tree breaks distance ties arbitrarily, so widen the query until
        // every point tied with the k-th neighbor is in hand
        let len = self.cloud.len();
        loop {
            let mut neighbors = self.ranked(tree, query, count);
            let kth = neighbors[k - 1].distance;
            let farthest = neighbors.last().map_or(kth, |n| n.distance);
            if count.get() == len || farthest > kth {
                neighbors.truncate(k);
                return Ok(neighbors);
            }
            count = NonZeroUsize::new((count.get() * 2).min(len)).unwrap_or(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::BruteForceIndex;

    #[test]
    fn test_knn() -> Result<(), PointCloudError> {
        let cloud = Arc::new(PointCloud::new(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]));
        let tree = KdTree::new(cloud);

        let knn = tree.nearest_neighbors(&[0.0, 0.0, 0.0], 1)?;
        assert_eq!(
            knn,
            vec![Neighbor {
                index: 0,
                distance: 0.0
            }]
        );

        let knn = tree.nearest_neighbors(&[0.1, 0.0, 0.0], 4)?;
        assert_eq!(knn.len(), 4);
        assert_eq!(knn[0].index, 0);
        assert_eq!(knn[1].index, 1);
        Ok(())
    }

    #[test]
    fn test_ties_resolve_to_smaller_index() -> Result<(), PointCloudError> {
        // integer grid: many neighbors share a distance from the centre
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..5 {
                    points.push([x as f64, y as f64, z as f64]);
                }
            }
        }
        let cloud = Arc::new(PointCloud::new(points));
        let tree = KdTree::new(cloud.clone());
        let brute = BruteForceIndex::new(cloud);

        for k in [1, 4, 7, 19, 27] {
            assert_eq!(
                tree.nearest_neighbors(&[2.0, 2.0, 2.0], k)?,
                brute.nearest_neighbors(&[2.0, 2.0, 2.0], k)?
            );
        }
        let knn = tree.nearest_neighbors(&[2.0, 2.0, 2.0], 4)?;
        let ids = knn.iter().map(|n| n.index).collect::<Vec<_>>();
        // centre 62, then the face neighbors 37 (x-1), 57 (y-1), 61 (z-1)
        assert_eq!(ids, vec![62, 37, 57, 61]);
        Ok(())
    }

    #[test]
    fn test_empty_tree() -> Result<(), PointCloudError> {
        let tree = KdTree::new(Arc::new(PointCloud::new(vec![])));
        assert!(tree.nearest_neighbors(&[0.0; 3], 0)?.is_empty());
        assert!(tree.nearest_neighbors(&[0.0; 3], 1).is_err());
        Ok(())
    }
}
