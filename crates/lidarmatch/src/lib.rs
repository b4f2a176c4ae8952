#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! ```rust
//! use std::sync::Arc;
//! use lidarmatch::{
//!     k3d::pointcloud::PointCloud,
//!     registration::{Registration, RegistrationConfig, RigidTransform},
//! };
//!
//! // a scattered scan and the same scan moved by a known transform
//! let points = (0..300)
//!     .map(|i| {
//!         [
//!             (i * 37 % 101) as f64 * 0.3,
//!             (i * 53 % 97) as f64 * 0.2,
//!             (i * 71 % 89) as f64 * 0.1,
//!         ]
//!     })
//!     .collect::<Vec<_>>();
//! let cloud1 = PointCloud::new(points);
//! let expected = RigidTransform::from_params(&[0.0, 0.0, 0.4, 1.0, -2.0, 0.5]);
//! let cloud2 = expected.apply_cloud(&cloud1);
//!
//! let registration = Registration::new(RegistrationConfig::default());
//! let result = registration.register(Arc::new(cloud1), Arc::new(cloud2))?;
//! println!("estimated: {:?}", result.transform.to_params());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[doc(inline)]
pub use lidarmatch_3d as k3d;

#[doc(inline)]
pub use lidarmatch_features as features;

#[doc(inline)]
pub use lidarmatch_registration as registration;
