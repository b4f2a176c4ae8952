use std::collections::BinaryHeap;
use std::sync::Arc;

use super::{check_available, Neighbor, SpatialIndex};
use crate::{ops::euclidean_distance, pointcloud::PointCloud, PointCloudError};

/// Exhaustive nearest-neighbor search, linear in the cloud size per query.
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    cloud: Arc<PointCloud>,
}

impl BruteForceIndex {
    /// Wrap a cloud for exhaustive search.
    pub fn new(cloud: Arc<PointCloud>) -> Self {
        Self { cloud }
    }
}

impl SpatialIndex for BruteForceIndex {
    fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    fn nearest_neighbors(
        &self,
        query: &[f64; 3],
        k: usize,
    ) -> Result<Vec<Neighbor>, PointCloudError> {
        check_available(&self.cloud, k)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (index, point) in self.cloud.points().iter().enumerate() {
            let candidate = Neighbor {
                index,
                distance: euclidean_distance(point, query),
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|top| candidate < *top) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap.into_sorted_vec())
    }
}
