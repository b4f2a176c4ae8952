#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::FeatureError;

/// Pearson correlation between distance histograms.
pub mod correlation;

/// Descriptor sets and brute-force descriptor matching.
pub mod descriptor;

/// Keypoint and descriptor extraction interface.
pub mod extractor;

/// Distance histograms describing the neighborhood of a keypoint.
pub mod histogram;

/// Ranking keypoint pairs by histogram correlation.
pub mod matcher;

mod topk;

pub use correlation::correlation;
pub use descriptor::{match_descriptors, DescriptorMatchConfig, DescriptorMetric, DescriptorSet};
pub use extractor::{FeatureExtractor, StrideExtractor};
pub use histogram::{DistanceHistogram, HistogramBinning, HistogramConfig};
pub use matcher::{
    CorrelationMatcher, ExecutionStrategy, MatchBudget, MatchConfig, MatchList, MatchPolicy,
    MatchRecord,
};
