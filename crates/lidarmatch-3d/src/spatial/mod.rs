//! Nearest-neighbor search over a [`PointCloud`].
//!
//! The matching core only needs the [`SpatialIndex`] capability, so tests can
//! run against [`BruteForceIndex`] while production code uses [`KdTree`].

mod brute_force;
mod kdtree;

pub use brute_force::BruteForceIndex;
pub use kdtree::KdTree;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::{pointcloud::PointCloud, PointCloudError};

/// A neighbor returned by a spatial query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbor in the queried cloud.
    pub index: usize,
    /// Euclidean distance from the query point.
    pub distance: f64,
}

impl Neighbor {
    /// Order by distance, then by index so equal distances resolve the same
    /// way across index implementations.
    pub(crate) fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

// heap entries are ranked so the worst neighbor sits on top of a max-heap
impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// K-nearest-neighbor capability over a point cloud.
///
/// Implementations must be safe to query concurrently from several threads.
pub trait SpatialIndex: Send + Sync {
    /// The cloud this index was built over.
    fn cloud(&self) -> &PointCloud;

    /// The `k` nearest points to `query`, sorted by ascending distance.
    ///
    /// Fails with [`PointCloudError::InsufficientNeighbors`] if the cloud has
    /// fewer than `k` points.
    fn nearest_neighbors(
        &self,
        query: &[f64; 3],
        k: usize,
    ) -> Result<Vec<Neighbor>, PointCloudError>;

    /// The `k` nearest points to the cloud point at `index`, excluding itself.
    fn nearest_neighbors_of(
        &self,
        index: usize,
        k: usize,
    ) -> Result<Vec<Neighbor>, PointCloudError> {
        let cloud = self.cloud();
        let query = cloud.point(index)?;
        let available = cloud.len() - 1;
        if k > available {
            return Err(PointCloudError::InsufficientNeighbors {
                requested: k,
                available,
            });
        }

        let mut neighbors = self.nearest_neighbors(query, k + 1)?;
        match neighbors.iter().position(|n| n.index == index) {
            Some(pos) => {
                neighbors.remove(pos);
            }
            // a duplicate point shadowed the query
            None => neighbors.truncate(k),
        }
        Ok(neighbors)
    }
}

/// The spatial index implementation to build over a cloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Balanced k-d tree.
    #[default]
    KdTree,
    /// Exhaustive linear scan.
    BruteForce,
}

impl IndexKind {
    /// Build the index over `cloud`.
    pub fn build(self, cloud: Arc<PointCloud>) -> Box<dyn SpatialIndex> {
        match self {
            IndexKind::KdTree => Box::new(KdTree::new(cloud)),
            IndexKind::BruteForce => Box::new(BruteForceIndex::new(cloud)),
        }
    }
}

pub(crate) fn check_available(cloud: &PointCloud, k: usize) -> Result<(), PointCloudError> {
    if k > cloud.len() {
        return Err(PointCloudError::InsufficientNeighbors {
            requested: k,
            available: cloud.len(),
        });
    }
    Ok(())
}
