use crate::PointCloudError;

/// A point cloud holding the points of one LiDAR scan.
///
/// The cloud is immutable once built. Share it between components behind an
/// [`std::sync::Arc`] so every holder keeps a read-only view.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from a list of points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Create a new point cloud, rejecting an empty list of points.
    pub fn try_new(points: Vec<[f64; 3]>) -> Result<Self, PointCloudError> {
        if points.is_empty() {
            return Err(PointCloudError::EmptyData);
        }
        Ok(Self { points })
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get the point at `index`, failing if it lies outside the cloud.
    pub fn point(&self, index: usize) -> Result<&[f64; 3], PointCloudError> {
        self.points
            .get(index)
            .ok_or(PointCloudError::IndexOutOfBounds {
                index,
                len: self.points.len(),
            })
    }

    /// Get the axis-aligned bounds of the cloud as `(min, max)`.
    ///
    /// Returns `None` for an empty cloud.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = *self.points.first()?;
        let bounds = self.points.iter().fold((first, first), |(mut lo, mut hi), p| {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(p[axis]);
                hi[axis] = hi[axis].max(p[axis]);
            }
            (lo, hi)
        });
        Some(bounds)
    }
}

impl From<Vec<[f64; 3]>> for PointCloud {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}
