use faer::Mat;

use lidarmatch_3d::{keypoints::KeypointIndexSet, ops::centroid, pointcloud::PointCloud};
use lidarmatch_features::MatchList;

use crate::{
    estimator::{matched_points, PoseEstimate, PoseEstimator},
    transform::RigidTransform,
    RegistrationError,
};

/// Minimum number of point pairs fixing a rigid transform.
pub const MIN_CORRESPONDENCES: usize = 3;

/// Least-squares rigid fit over all matches (Kabsch).
#[derive(Debug, Clone, Copy, Default)]
pub struct SvdEstimator;

impl PoseEstimator for SvdEstimator {
    fn estimate_with_inliers(
        &self,
        cloud1: &PointCloud,
        keypoints1: &KeypointIndexSet,
        cloud2: &PointCloud,
        keypoints2: &KeypointIndexSet,
        matches: &MatchList,
    ) -> Result<PoseEstimate, RegistrationError> {
        let (src, dst) = matched_points(cloud1, keypoints1, cloud2, keypoints2, matches)?;
        let transform = fit_rigid_transform(&src, &dst)?;
        Ok(PoseEstimate {
            transform,
            inliers: (0..src.len()).collect(),
        })
    }
}

/// Find the rotation and translation minimizing `sum |R * src_i + t - dst_i|^2`.
///
/// # Arguments
///
/// * `src` - Points in the source frame.
/// * `dst` - The corresponding points in the destination frame.
///
/// # Errors
///
/// Fails if fewer than three pairs are given, if the slices differ in length,
/// or if the source points are coincident or collinear.
pub fn fit_rigid_transform(
    src: &[[f64; 3]],
    dst: &[[f64; 3]],
) -> Result<RigidTransform, RegistrationError> {
    if src.len() != dst.len() {
        return Err(RegistrationError::InvalidParams(format!(
            "{} source points for {} destination points",
            src.len(),
            dst.len()
        )));
    }
    if src.len() < MIN_CORRESPONDENCES {
        return Err(RegistrationError::InsufficientMatches {
            required: MIN_CORRESPONDENCES,
            actual: src.len(),
        });
    }

    let (Some(src_centroid), Some(dst_centroid)) = (centroid(src), centroid(dst)) else {
        return Err(RegistrationError::InsufficientMatches {
            required: MIN_CORRESPONDENCES,
            actual: 0,
        });
    };

    let src_centered = center(src, &src_centroid);
    let dst_centered = center(dst, &dst_centroid);
    if is_degenerate(&src_centered) {
        return Err(RegistrationError::DegenerateCorrespondences);
    }

    // cross-covariance H = sum(src_i * dst_i^T)
    let mut h = [[0.0; 3]; 3];
    for (s, d) in src_centered.iter().zip(dst_centered.iter()) {
        for (i, row) in h.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val += s[i] * d[j];
            }
        }
    }

    let h_mat = Mat::<f64>::from_fn(3, 3, |i, j| h[i][j]);
    let svd = h_mat
        .svd()
        .map_err(|e| RegistrationError::SvdFailed(format!("{e:?}")))?;
    let u = svd.U();
    let v = svd.V();

    // R = V * U^T, flipping the last column of V on a reflection
    let rotation_with = |sign: f64| {
        let mut r = [[0.0; 3]; 3];
        for (i, row) in r.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = v[(i, 0)] * u[(j, 0)] + v[(i, 1)] * u[(j, 1)] + sign * v[(i, 2)] * u[(j, 2)];
            }
        }
        r
    };
    let mut rotation = rotation_with(1.0);
    if lidarmatch_3d::linalg::det33(&rotation) < 0.0 {
        rotation = rotation_with(-1.0);
    }

    let rotated = lidarmatch_3d::linalg::transform_point3d(&src_centroid, &rotation, &[0.0; 3]);
    let translation = [
        dst_centroid[0] - rotated[0],
        dst_centroid[1] - rotated[1],
        dst_centroid[2] - rotated[2],
    ];

    Ok(RigidTransform {
        rotation,
        translation,
    })
}

fn center(points: &[[f64; 3]], c: &[f64; 3]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| [p[0] - c[0], p[1] - c[1], p[2] - c[2]])
        .collect()
}

// coincident or collinear points leave the rotation about their line free
fn is_degenerate(centered: &[[f64; 3]]) -> bool {
    let norm = |p: &[f64; 3]| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    let Some(far) = centered.iter().max_by(|a, b| norm(a).total_cmp(&norm(b))) else {
        return true;
    };
    let scale = norm(far);
    if scale < 1e-12 {
        return true;
    }
    let axis = [far[0] / scale, far[1] / scale, far[2] / scale];
    let off_axis = centered
        .iter()
        .map(|p| {
            norm(&[
                p[1] * axis[2] - p[2] * axis[1],
                p[2] * axis[0] - p[0] * axis[2],
                p[0] * axis[1] - p[1] * axis[0],
            ])
        })
        .fold(0.0, f64::max);
    off_axis < 1e-9 * scale
}
