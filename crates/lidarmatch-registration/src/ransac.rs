use rand::{rngs::StdRng, seq::index, SeedableRng};

use lidarmatch_3d::{keypoints::KeypointIndexSet, ops::euclidean_distance, pointcloud::PointCloud};
use lidarmatch_features::MatchList;

use crate::{
    estimator::{matched_points, PoseEstimate, PoseEstimator},
    svd::{fit_rigid_transform, MIN_CORRESPONDENCES},
    transform::RigidTransform,
    RegistrationError,
};

/// Parameters for RANSAC over the rigid fit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Distance in metres below which a transformed match counts as inlier.
    pub inlier_threshold: f64,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f64,
    /// Minimum number of inliers for a valid model.
    pub min_inliers: usize,
    /// Optional fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
    /// Whether to refit on all inliers of the best model.
    pub refine: bool,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            inlier_threshold: 0.5,
            confidence: 0.99,
            min_inliers: MIN_CORRESPONDENCES,
            random_seed: None,
            refine: true,
        }
    }
}

impl RansacParams {
    fn validate(&self) -> Result<(), RegistrationError> {
        if self.max_iterations == 0 {
            return Err(RegistrationError::InvalidParams(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if !(self.inlier_threshold.is_finite() && self.inlier_threshold > 0.0) {
            return Err(RegistrationError::InvalidParams(format!(
                "inlier_threshold must be finite and positive, got {}",
                self.inlier_threshold
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(RegistrationError::InvalidParams(format!(
                "confidence must lie in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Rigid fit on random minimal samples of three matches, keeping the model
/// with the largest consensus set.
#[derive(Debug, Clone, Default)]
pub struct RansacEstimator {
    params: RansacParams,
}

impl RansacEstimator {
    /// Create an estimator with the given parameters.
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }

    /// The estimator parameters.
    pub fn params(&self) -> &RansacParams {
        &self.params
    }

    /// Run RANSAC directly on matched point pairs.
    ///
    /// # Arguments
    ///
    /// * `src` - Matched points of the first scan.
    /// * `dst` - The corresponding points of the second scan.
    ///
    /// # Returns
    ///
    /// The best transform and the positions of its inliers in `src`.
    pub fn fit(&self, src: &[[f64; 3]], dst: &[[f64; 3]]) -> Result<PoseEstimate, RegistrationError> {
        let params = &self.params;
        params.validate()?;

        let n = src.len();
        if n != dst.len() {
            return Err(RegistrationError::InvalidParams(format!(
                "{n} source points for {} destination points",
                dst.len()
            )));
        }
        if n < MIN_CORRESPONDENCES {
            return Err(RegistrationError::InsufficientMatches {
                required: MIN_CORRESPONDENCES,
                actual: n,
            });
        }

        let mut rng = match params.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut best: Option<(RigidTransform, Vec<usize>, f64)> = None;
        let mut required_iters = params.max_iterations;
        let mut iter = 0;
        let mut degenerate = 0;

        while iter < required_iters {
            iter += 1;

            let sample = index::sample(&mut rng, n, MIN_CORRESPONDENCES);
            let s_src = sample.iter().map(|i| src[i]).collect::<Vec<_>>();
            let s_dst = sample.iter().map(|i| dst[i]).collect::<Vec<_>>();

            let model = match fit_rigid_transform(&s_src, &s_dst) {
                Ok(model) => model,
                Err(RegistrationError::DegenerateCorrespondences) => {
                    degenerate += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (inliers, cost) = classify_inliers(&model, src, dst, params.inlier_threshold);
            let improved = match &best {
                None => true,
                Some((_, best_inliers, best_cost)) => {
                    inliers.len() > best_inliers.len()
                        || (inliers.len() == best_inliers.len() && cost < *best_cost)
                }
            };
            if !improved {
                continue;
            }

            // shrink the iteration count from the current inlier ratio
            let w = inliers.len() as f64 / n as f64;
            if w >= 1.0 {
                required_iters = iter;
            } else if w > 0.0 {
                let denom = (1.0 - w.powi(MIN_CORRESPONDENCES as i32)).ln();
                let est = ((1.0 - params.confidence).ln() / denom).ceil();
                if est.is_finite() && est > 0.0 {
                    required_iters = required_iters.min((est as usize).max(iter));
                }
            }
            best = Some((model, inliers, cost));
        }

        log::debug!(
            "RANSAC ran {iter} iterations ({degenerate} degenerate samples) over {n} matches"
        );

        let min_inliers = params.min_inliers.max(MIN_CORRESPONDENCES);
        let (mut transform, mut inliers, _) = match best {
            Some(best) if best.1.len() >= min_inliers => best,
            _ => return Err(RegistrationError::NoConsensus),
        };

        if params.refine {
            let in_src = inliers.iter().map(|&i| src[i]).collect::<Vec<_>>();
            let in_dst = inliers.iter().map(|&i| dst[i]).collect::<Vec<_>>();
            let refined = fit_rigid_transform(&in_src, &in_dst)?;
            let (refined_inliers, _) = classify_inliers(&refined, src, dst, params.inlier_threshold);
            if refined_inliers.len() >= inliers.len() {
                transform = refined;
                inliers = refined_inliers;
            }
        }

        log::debug!("RANSAC kept {}/{} inliers", inliers.len(), n);

        Ok(PoseEstimate { transform, inliers })
    }
}

impl PoseEstimator for RansacEstimator {
    fn estimate_with_inliers(
        &self,
        cloud1: &PointCloud,
        keypoints1: &KeypointIndexSet,
        cloud2: &PointCloud,
        keypoints2: &KeypointIndexSet,
        matches: &MatchList,
    ) -> Result<PoseEstimate, RegistrationError> {
        let (src, dst) = matched_points(cloud1, keypoints1, cloud2, keypoints2, matches)?;
        self.fit(&src, &dst)
    }
}

// inlier positions and the truncated squared residual of the model
fn classify_inliers(
    model: &RigidTransform,
    src: &[[f64; 3]],
    dst: &[[f64; 3]],
    threshold: f64,
) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut cost = 0.0;
    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let residual = euclidean_distance(&model.apply(s), d);
        if residual <= threshold {
            inliers.push(i);
            cost += residual * residual;
        } else {
            cost += threshold * threshold;
        }
    }
    (inliers, cost)
}
