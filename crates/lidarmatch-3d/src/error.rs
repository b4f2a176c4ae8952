/// Errors raised by point cloud containers and spatial queries.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PointCloudError {
    /// The point cloud holds no points.
    #[error("Pointcloud data is empty")]
    EmptyData,

    /// More neighbors were requested than the cloud can provide.
    #[error("Requested {requested} neighbors but only {available} are available")]
    InsufficientNeighbors {
        /// Number of neighbors requested.
        requested: usize,
        /// Number of candidate points in the cloud.
        available: usize,
    },

    /// A point index lies outside the cloud.
    #[error("Point index {index} is out of bounds for a cloud of {len} points")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Number of points in the cloud.
        len: usize,
    },

    /// A rotation axis with zero length was given.
    #[error("Cannot compute a rotation from a zero-length axis")]
    InvalidAxis,
}
