use lidarmatch_3d::PointCloudError;
use lidarmatch_features::FeatureError;

/// Errors raised while estimating a rigid transform.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Too few matches for the estimator.
    #[error("Estimator requires at least {required} matches, got {actual}")]
    InsufficientMatches {
        /// Minimum number of matches.
        required: usize,
        /// Number of matches provided.
        actual: usize,
    },

    /// The matched points do not span enough directions to fix a rotation.
    #[error("Matched points are degenerate (coincident or collinear)")]
    DegenerateCorrespondences,

    /// Singular value decomposition failed.
    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    /// No sampled model reached the minimum number of inliers.
    #[error("RANSAC found no consensus set")]
    NoConsensus,

    /// Invalid estimator parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Error from the matching stage.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Error from the point cloud layer.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}
