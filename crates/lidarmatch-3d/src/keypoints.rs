use crate::{pointcloud::PointCloud, PointCloudError};

/// An ordered set of keypoint indices into a [`PointCloud`].
///
/// Insertion order is preserved and defines the position of each keypoint,
/// which is how match records and descriptor rows refer to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeypointIndexSet {
    indices: Vec<usize>,
}

impl KeypointIndexSet {
    /// Create a keypoint set from raw cloud indices.
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// Create a keypoint set and check every index against `cloud`.
    pub fn try_new(indices: Vec<usize>, cloud: &PointCloud) -> Result<Self, PointCloudError> {
        let set = Self { indices };
        set.validate(cloud)?;
        Ok(set)
    }

    /// Check that every index lies within `cloud`.
    pub fn validate(&self, cloud: &PointCloud) -> Result<(), PointCloudError> {
        match self.indices.iter().find(|&&idx| idx >= cloud.len()) {
            Some(&index) => Err(PointCloudError::IndexOutOfBounds {
                index,
                len: cloud.len(),
            }),
            None => Ok(()),
        }
    }

    /// Number of keypoints.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the set holds no keypoints.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The raw cloud indices in insertion order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// The cloud index stored at `position`.
    pub fn get(&self, position: usize) -> Option<usize> {
        self.indices.get(position).copied()
    }

    /// Keep only the keypoints at the given positions, in the given order.
    pub fn select(&self, positions: &[usize]) -> Result<Self, PointCloudError> {
        let indices = positions
            .iter()
            .map(|&pos| {
                self.get(pos).ok_or(PointCloudError::IndexOutOfBounds {
                    index: pos,
                    len: self.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { indices })
    }

    /// Iterate over the raw cloud indices.
    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.indices.iter()
    }
}

impl From<Vec<usize>> for KeypointIndexSet {
    fn from(indices: Vec<usize>) -> Self {
        Self::new(indices)
    }
}

impl FromIterator<usize> for KeypointIndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a KeypointIndexSet {
    type Item = &'a usize;
    type IntoIter = std::slice::Iter<'a, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.indices.iter()
    }
}
