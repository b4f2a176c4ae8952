use lidarmatch_3d::{keypoints::KeypointIndexSet, pointcloud::PointCloud};
use lidarmatch_features::MatchList;

use crate::{
    ransac::{RansacEstimator, RansacParams},
    svd::SvdEstimator,
    transform::RigidTransform,
    RegistrationError,
};

/// A transform together with the matches that support it.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    /// Transform from scan 1 into scan 2.
    pub transform: RigidTransform,
    /// Positions in the match list consistent with the transform.
    pub inliers: Vec<usize>,
}

/// Estimates the rigid transform aligning two scans from their matches.
pub trait PoseEstimator: Send + Sync {
    /// Estimate the transform mapping `cloud1` onto `cloud2`.
    ///
    /// # Arguments
    ///
    /// * `cloud1` - The first scan.
    /// * `keypoints1` - Keypoints of the first scan.
    /// * `cloud2` - The second scan.
    /// * `keypoints2` - Keypoints of the second scan.
    /// * `matches` - Ranked matches between the keypoint sets.
    fn estimate(
        &self,
        cloud1: &PointCloud,
        keypoints1: &KeypointIndexSet,
        cloud2: &PointCloud,
        keypoints2: &KeypointIndexSet,
        matches: &MatchList,
    ) -> Result<RigidTransform, RegistrationError> {
        self.estimate_with_inliers(cloud1, keypoints1, cloud2, keypoints2, matches)
            .map(|estimate| estimate.transform)
    }

    /// Like [`PoseEstimator::estimate`], also reporting which matches agree
    /// with the transform.
    fn estimate_with_inliers(
        &self,
        cloud1: &PointCloud,
        keypoints1: &KeypointIndexSet,
        cloud2: &PointCloud,
        keypoints2: &KeypointIndexSet,
        matches: &MatchList,
    ) -> Result<PoseEstimate, RegistrationError>;
}

/// Choice of pose estimator, made at configuration time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorConfig {
    /// Least-squares fit over every match.
    Svd,
    /// Consensus fit rejecting wrong matches.
    Ransac(RansacParams),
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig::Ransac(RansacParams::default())
    }
}

impl EstimatorConfig {
    /// Build the configured estimator.
    pub fn build(&self) -> Box<dyn PoseEstimator> {
        match self {
            EstimatorConfig::Svd => Box::new(SvdEstimator),
            EstimatorConfig::Ransac(params) => Box::new(RansacEstimator::new(params.clone())),
        }
    }
}

/// Look up the matched point pairs, in match order.
pub(crate) fn matched_points(
    cloud1: &PointCloud,
    keypoints1: &KeypointIndexSet,
    cloud2: &PointCloud,
    keypoints2: &KeypointIndexSet,
    matches: &MatchList,
) -> Result<(Vec<[f64; 3]>, Vec<[f64; 3]>), RegistrationError> {
    let pairs = matches.resolve(keypoints1, keypoints2)?;
    let mut src = Vec::with_capacity(pairs.len());
    let mut dst = Vec::with_capacity(pairs.len());
    for (i, j) in pairs {
        src.push(*cloud1.point(i)?);
        dst.push(*cloud2.point(j)?);
    }
    Ok((src, dst))
}
