use std::sync::Arc;
use std::time::Instant;

use lidarmatch_3d::{keypoints::KeypointIndexSet, pointcloud::PointCloud};
use lidarmatch_features::{
    descriptor::candidate_pairs, match_descriptors, CorrelationMatcher, DescriptorMatchConfig,
    FeatureExtractor, MatchConfig, MatchList, StrideExtractor,
};

use crate::{
    estimator::{EstimatorConfig, PoseEstimator},
    transform::RigidTransform,
    RegistrationError,
};

/// Configuration of the full registration pipeline.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Keypoint and descriptor extraction.
    pub extractor: StrideExtractor,
    /// Descriptor matching used to restrict the correlation sweep, if any.
    pub prefilter: Option<DescriptorMatchConfig>,
    /// Correlation matching.
    pub matching: MatchConfig,
    /// Number of ranked matches handed to the estimator.
    pub match_num: usize,
    /// Pose estimator.
    pub estimator: EstimatorConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            extractor: StrideExtractor::default(),
            prefilter: None,
            matching: MatchConfig::default(),
            match_num: 100,
            estimator: EstimatorConfig::default(),
        }
    }
}

/// Output of [`Registration::register`].
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Keypoints of the first scan.
    pub keypoints1: KeypointIndexSet,
    /// Keypoints of the second scan.
    pub keypoints2: KeypointIndexSet,
    /// Ranked matches between the keypoint sets.
    pub matches: MatchList,
    /// Transform from scan 1 into scan 2.
    pub transform: RigidTransform,
    /// Positions in `matches` consistent with the transform.
    pub inliers: Vec<usize>,
}

/// Aligns two scans: extract keypoints, match them, estimate the transform.
pub struct Registration {
    extractor: Box<dyn FeatureExtractor>,
    prefilter: Option<DescriptorMatchConfig>,
    matcher: CorrelationMatcher,
    match_num: usize,
    estimator: Box<dyn PoseEstimator>,
}

impl Registration {
    /// Build the pipeline from its configuration.
    pub fn new(config: RegistrationConfig) -> Self {
        Self {
            extractor: Box::new(config.extractor),
            prefilter: config.prefilter,
            matcher: CorrelationMatcher::new(config.matching),
            match_num: config.match_num,
            estimator: config.estimator.build(),
        }
    }

    /// Replace the keypoint extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the pose estimator.
    pub fn with_estimator(mut self, estimator: Box<dyn PoseEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Estimate the transform mapping `cloud1` onto `cloud2`.
    pub fn register(
        &self,
        cloud1: Arc<PointCloud>,
        cloud2: Arc<PointCloud>,
    ) -> Result<RegistrationResult, RegistrationError> {
        let start = Instant::now();

        let keypoints1 = self.extractor.extract_keypoints(&cloud1)?;
        let keypoints2 = self.extractor.extract_keypoints(&cloud2)?;
        log::debug!(
            "Extracted {} and {} keypoints",
            keypoints1.len(),
            keypoints2.len()
        );

        let index_kind = self.matcher.config().index;
        let index1 = index_kind.build(cloud1.clone());
        let index2 = index_kind.build(cloud2.clone());

        let matches = match &self.prefilter {
            Some(config) => {
                let descriptors1 = self.extractor.extract_descriptors(&cloud1, &keypoints1)?;
                let descriptors2 = self.extractor.extract_descriptors(&cloud2, &keypoints2)?;
                let candidates =
                    candidate_pairs(&match_descriptors(&descriptors1, &descriptors2, config)?);
                log::debug!("Descriptor prefilter kept {} candidates", candidates.len());
                self.matcher.match_candidates(
                    &keypoints1,
                    &keypoints2,
                    index1.as_ref(),
                    index2.as_ref(),
                    &candidates,
                    self.match_num,
                )?
            }
            None => self.matcher.match_keypoints(
                &keypoints1,
                &keypoints2,
                index1.as_ref(),
                index2.as_ref(),
                self.match_num,
            )?,
        };
        if matches.len() < self.match_num {
            log::warn!(
                "Only {} of {} requested matches available",
                matches.len(),
                self.match_num
            );
        }

        let estimate = self.estimator.estimate_with_inliers(
            &cloud1,
            &keypoints1,
            &cloud2,
            &keypoints2,
            &matches,
        )?;

        log::info!(
            "Registered scans with {} matches, {} inliers, rotation {:.4} rad, translation {:.3} m in {:?}",
            matches.len(),
            estimate.inliers.len(),
            estimate.transform.rotation_angle(),
            estimate.transform.translation_norm(),
            start.elapsed()
        );

        Ok(RegistrationResult {
            keypoints1,
            keypoints2,
            matches,
            transform: estimate.transform,
            inliers: estimate.inliers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lidarmatch_features::{HistogramConfig, MatchPolicy};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::{ransac::RansacParams, svd::SvdEstimator};

    fn random_cloud(num_points: usize, seed: u64) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        PointCloud::new(
            (0..num_points)
                .map(|_| {
                    [
                        rng.random_range(-15.0..15.0),
                        rng.random_range(-15.0..15.0),
                        rng.random_range(-5.0..5.0),
                    ]
                })
                .collect(),
        )
    }

    fn config(prefilter: Option<DescriptorMatchConfig>) -> RegistrationConfig {
        RegistrationConfig {
            extractor: StrideExtractor {
                stride: 20,
                offset: 0,
                histogram: HistogramConfig {
                    near_points_num: 10,
                    ..Default::default()
                },
            },
            prefilter,
            matching: MatchConfig {
                histogram: HistogramConfig {
                    near_points_num: 10,
                    ..Default::default()
                },
                policy: MatchPolicy::OneToOne,
                ..Default::default()
            },
            match_num: 20,
            estimator: EstimatorConfig::Ransac(RansacParams {
                inlier_threshold: 0.05,
                random_seed: Some(1),
                ..Default::default()
            }),
        }
    }

    fn assert_recovers(result: &RegistrationResult, expected: &RigidTransform) {
        for i in 0..3 {
            assert_relative_eq!(result.transform.translation[i], expected.translation[i], epsilon = 1e-6);
            for j in 0..3 {
                assert_relative_eq!(
                    result.transform.rotation[i][j],
                    expected.rotation[i][j],
                    epsilon = 1e-6
                );
            }
        }
    }

    #[test]
    fn test_register_rigid_copy() -> Result<(), RegistrationError> {
        let expected = RigidTransform::from_params(&[0.05, -0.1, 0.6, 2.0, -3.0, 0.4]);
        let cloud1 = random_cloud(600, 10);
        let cloud2 = expected.apply_cloud(&cloud1);

        let registration = Registration::new(config(None));
        let result = registration.register(Arc::new(cloud1), Arc::new(cloud2))?;
        assert_eq!(result.matches.len(), 20);
        assert!(result.inliers.len() >= 3);
        assert_recovers(&result, &expected);
        Ok(())
    }

    #[test]
    fn test_register_with_prefilter_and_svd() -> Result<(), RegistrationError> {
        let expected = RigidTransform::from_params(&[0.0, 0.0, -0.3, 0.5, 0.5, 0.0]);
        let cloud1 = random_cloud(400, 12);
        let cloud2 = expected.apply_cloud(&cloud1);

        let registration = Registration::new(config(Some(DescriptorMatchConfig {
            cross_check: true,
            ..Default::default()
        })))
        .with_estimator(Box::new(SvdEstimator));
        let result = registration.register(Arc::new(cloud1), Arc::new(cloud2))?;
        assert_eq!(result.inliers.len(), result.matches.len());
        assert!(result.matches.iter().all(|m| m.idx1 == m.idx2));
        assert_recovers(&result, &expected);
        Ok(())
    }

    #[test]
    fn test_config_json_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config: RegistrationConfig =
            serde_json::from_str(r#"{ "match_num": 50, "estimator": "svd" }"#)?;
        assert_eq!(config.match_num, 50);
        assert_eq!(config.estimator, EstimatorConfig::Svd);
        assert_eq!(config.matching, MatchConfig::default());
        assert_eq!(config.prefilter, None);
        Ok(())
    }
}
