use std::time::Duration;

use lidarmatch_3d::PointCloudError;

/// Errors raised by the feature matching stages.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// An input was empty or malformed where a valid value is required.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A descriptor set passed to the matcher holds no descriptors.
    #[error("Descriptor set is empty")]
    EmptyInput,

    /// Two vectors that must share a length do not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected length.
        expected: usize,
        /// The length found.
        actual: usize,
    },

    /// A histogram has zero variance so its correlation is undefined.
    #[error("Histogram has zero variance")]
    DegenerateHistogram,

    /// A feature extractor failed to produce keypoints or descriptors.
    #[error("Feature extraction failed: {0}")]
    Extraction(String),

    /// The pair sweep ran past its wall-time limit.
    #[error("Matching exceeded its deadline: {elapsed:?} > {limit:?}")]
    DeadlineExceeded {
        /// Time spent when the limit was detected.
        elapsed: Duration,
        /// The configured limit.
        limit: Duration,
    },

    /// The pair sweep would evaluate more pairs than allowed.
    #[error("Matching would evaluate {pairs} pairs, more than the limit of {max_pairs}")]
    PairBudgetExceeded {
        /// Number of pairs requested.
        pairs: usize,
        /// The configured limit.
        max_pairs: usize,
    },

    /// A worker thread pool could not be built.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    /// A point cloud or spatial query error.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}
