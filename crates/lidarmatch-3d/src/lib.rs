#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::PointCloudError;

/// Keypoint index sets over a point cloud.
pub mod keypoints;

/// Linear algebra utilities.
pub mod linalg;

/// Operations on 3D points.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Nearest-neighbor search over point clouds.
pub mod spatial;

/// 3D transforms algorithms.
pub mod transforms;
