#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::RegistrationError;

/// Rigid transforms between scan frames.
pub mod transform;

/// The pose estimator interface and its configuration.
pub mod estimator;

/// Closed-form least-squares rigid fit.
pub mod svd;

/// Consensus estimation robust to wrong matches.
pub mod ransac;

/// End-to-end scan registration.
pub mod pipeline;

pub use estimator::{EstimatorConfig, PoseEstimate, PoseEstimator};
pub use pipeline::{Registration, RegistrationConfig, RegistrationResult};
pub use ransac::{RansacEstimator, RansacParams};
pub use svd::SvdEstimator;
pub use transform::RigidTransform;
