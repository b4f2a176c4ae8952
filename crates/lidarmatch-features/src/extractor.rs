use lidarmatch_3d::{
    keypoints::KeypointIndexSet,
    pointcloud::PointCloud,
    spatial::{BruteForceIndex, KdTree, SpatialIndex},
};
use std::sync::Arc;

use crate::{
    descriptor::DescriptorSet,
    histogram::{DistanceHistogram, HistogramConfig},
    FeatureError,
};

/// Source of keypoints and descriptors for a point cloud.
///
/// The matcher only relies on this contract, so NARF, SIFT or FPFH
/// implementations from other libraries can be plugged in. Implementations
/// should report their own failures as [`FeatureError::Extraction`].
pub trait FeatureExtractor: Send + Sync {
    /// Select the keypoints of `cloud`.
    fn extract_keypoints(&self, cloud: &PointCloud) -> Result<KeypointIndexSet, FeatureError>;

    /// Compute one descriptor row per keypoint, in keypoint order.
    fn extract_descriptors(
        &self,
        cloud: &PointCloud,
        keypoints: &KeypointIndexSet,
    ) -> Result<DescriptorSet, FeatureError>;
}

/// Reference extractor taking every `stride`-th point as a keypoint and its
/// distance histogram as descriptor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StrideExtractor {
    /// Distance between consecutive keypoint indices.
    pub stride: usize,
    /// Index of the first keypoint.
    pub offset: usize,
    /// Histogram used as descriptor.
    pub histogram: HistogramConfig,
}

impl Default for StrideExtractor {
    fn default() -> Self {
        Self {
            stride: 10,
            offset: 0,
            histogram: HistogramConfig::default(),
        }
    }
}

impl StrideExtractor {
    /// Create an extractor with the given stride and default histogram.
    pub fn new(stride: usize) -> Self {
        Self {
            stride,
            ..Default::default()
        }
    }
}

impl FeatureExtractor for StrideExtractor {
    fn extract_keypoints(&self, cloud: &PointCloud) -> Result<KeypointIndexSet, FeatureError> {
        if self.stride == 0 {
            return Err(FeatureError::Extraction("stride must be >= 1".to_string()));
        }
        if cloud.is_empty() {
            return Err(FeatureError::Extraction("empty point cloud".to_string()));
        }
        let keypoints = (self.offset..cloud.len())
            .step_by(self.stride)
            .collect::<KeypointIndexSet>();
        log::debug!(
            "Extracted {} keypoints from {} points",
            keypoints.len(),
            cloud.len()
        );
        Ok(keypoints)
    }

    fn extract_descriptors(
        &self,
        cloud: &PointCloud,
        keypoints: &KeypointIndexSet,
    ) -> Result<DescriptorSet, FeatureError> {
        keypoints
            .validate(cloud)
            .map_err(|e| FeatureError::Extraction(e.to_string()))?;

        // the trait hands out a borrowed cloud, so the index gets its own copy
        let cloud = Arc::new(cloud.clone());
        let index: Box<dyn SpatialIndex> = match cloud.len() {
            0..=32 => Box::new(BruteForceIndex::new(cloud)),
            _ => Box::new(KdTree::new(cloud)),
        };

        let mut descriptors = DescriptorSet::new(self.histogram.len(), Vec::new())?;
        for &kp in keypoints {
            let hist = DistanceHistogram::compute(index.as_ref(), kp, &self.histogram)?;
            descriptors.push(hist.as_slice())?;
        }
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_cloud(num_points: usize) -> PointCloud {
        PointCloud::new((0..num_points).map(|i| [i as f64, 0.0, 0.0]).collect())
    }

    #[test]
    fn test_stride_keypoints() -> Result<(), FeatureError> {
        let cloud = line_cloud(25);
        let extractor = StrideExtractor {
            stride: 10,
            offset: 2,
            ..Default::default()
        };
        let keypoints = extractor.extract_keypoints(&cloud)?;
        assert_eq!(keypoints.indices(), &[2, 12, 22]);

        assert!(matches!(
            StrideExtractor::new(0).extract_keypoints(&cloud),
            Err(FeatureError::Extraction(_))
        ));
        assert!(matches!(
            StrideExtractor::new(1).extract_keypoints(&PointCloud::new(vec![])),
            Err(FeatureError::Extraction(_))
        ));
        Ok(())
    }

    #[test]
    fn test_stride_descriptors() -> Result<(), FeatureError> {
        let cloud = line_cloud(40);
        let extractor = StrideExtractor {
            stride: 13,
            offset: 0,
            histogram: HistogramConfig {
                near_points_num: 3,
                ..Default::default()
            },
        };
        let keypoints = extractor.extract_keypoints(&cloud)?;
        let descriptors = extractor.extract_descriptors(&cloud, &keypoints)?;
        assert_eq!(descriptors.len(), keypoints.len());
        assert_eq!(descriptors.dim(), 3);
        assert_eq!(descriptors.row(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(descriptors.row(1), Some(&[1.0, 1.0, 2.0][..]));

        let bad = KeypointIndexSet::new(vec![40]);
        assert!(matches!(
            extractor.extract_descriptors(&cloud, &bad),
            Err(FeatureError::Extraction(_))
        ));
        Ok(())
    }
}
