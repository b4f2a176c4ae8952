use lidarmatch_3d::spatial::SpatialIndex;

use crate::FeatureError;

/// How neighbor distances are aggregated into a fixed-length histogram.
///
/// Both clouds being compared must use the same binning, otherwise the
/// correlation between their histograms is meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistogramBinning {
    /// The ascending sequence of neighbor distances, one bucket per neighbor.
    #[default]
    SortedDistances,
    /// Counts over `num_bins` equal bins on `[0, max_distance)`. Distances past
    /// the range fall into the last bin.
    Uniform {
        /// Number of bins.
        num_bins: usize,
        /// Upper edge of the binned range.
        max_distance: f64,
    },
    /// Counts over `num_bins` equal bins spanning `[0, farthest neighbor]`.
    Normalized {
        /// Number of bins.
        num_bins: usize,
    },
}

/// Parameters of the per-keypoint distance histogram.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Number of nearest neighbors summarized by the histogram.
    pub near_points_num: usize,
    /// Aggregation of the neighbor distances.
    pub binning: HistogramBinning,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            near_points_num: 10,
            binning: HistogramBinning::SortedDistances,
        }
    }
}

impl HistogramConfig {
    /// Length of every histogram built with this configuration.
    pub fn len(&self) -> usize {
        match self.binning {
            HistogramBinning::SortedDistances => self.near_points_num,
            HistogramBinning::Uniform { num_bins, .. } => num_bins,
            HistogramBinning::Normalized { num_bins } => num_bins,
        }
    }

    /// Whether histograms built with this configuration would be empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the configuration before any histogram is computed.
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.near_points_num == 0 {
            return Err(FeatureError::InvalidInput(
                "near_points_num must be >= 1".to_string(),
            ));
        }
        match self.binning {
            HistogramBinning::SortedDistances => Ok(()),
            HistogramBinning::Uniform {
                num_bins,
                max_distance,
            } => {
                if num_bins == 0 {
                    return Err(FeatureError::InvalidInput("num_bins must be >= 1".to_string()));
                }
                if !(max_distance.is_finite() && max_distance > 0.0) {
                    return Err(FeatureError::InvalidInput(format!(
                        "max_distance must be finite and positive, got {max_distance}"
                    )));
                }
                Ok(())
            }
            HistogramBinning::Normalized { num_bins } => match num_bins {
                0 => Err(FeatureError::InvalidInput("num_bins must be >= 1".to_string())),
                _ => Ok(()),
            },
        }
    }
}

/// A fixed-length summary of the distances from a keypoint to its nearest
/// neighbors within its own cloud.
///
/// It depends only on relative distances, so it does not change under a rigid
/// motion of the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceHistogram(Vec<f64>);

impl DistanceHistogram {
    /// Compute the histogram of the cloud point at `keypoint`.
    ///
    /// # Arguments
    ///
    /// * `index` - Spatial index over the cloud owning the keypoint.
    /// * `keypoint` - Index of the keypoint in that cloud.
    /// * `config` - Neighbor count and binning.
    ///
    /// # Errors
    ///
    /// Fails with [`lidarmatch_3d::PointCloudError::InsufficientNeighbors`]
    /// (wrapped in [`FeatureError::PointCloud`]) if the cloud holds fewer than
    /// `near_points_num` points besides the keypoint.
    pub fn compute(
        index: &dyn SpatialIndex,
        keypoint: usize,
        config: &HistogramConfig,
    ) -> Result<Self, FeatureError> {
        config.validate()?;
        let neighbors = index.nearest_neighbors_of(keypoint, config.near_points_num)?;
        let distances = neighbors.iter().map(|n| n.distance).collect::<Vec<_>>();
        Self::from_distances(&distances, config)
    }

    /// Build a histogram from neighbor distances.
    ///
    /// `distances` must hold exactly `near_points_num` values.
    pub fn from_distances(distances: &[f64], config: &HistogramConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        if distances.len() != config.near_points_num {
            return Err(FeatureError::DimensionMismatch {
                expected: config.near_points_num,
                actual: distances.len(),
            });
        }

        let values = match config.binning {
            HistogramBinning::SortedDistances => {
                let mut sorted = distances.to_vec();
                sorted.sort_by(f64::total_cmp);
                sorted
            }
            HistogramBinning::Uniform {
                num_bins,
                max_distance,
            } => bin_counts(distances, num_bins, max_distance),
            HistogramBinning::Normalized { num_bins } => {
                let farthest = distances.iter().copied().fold(0.0, f64::max);
                bin_counts(distances, num_bins, farthest)
            }
        };

        Ok(Self(values))
    }

    /// Create a histogram from precomputed bucket values.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// The bucket values.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the histogram has no buckets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the histogram, returning its bucket values.
    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }
}

// `range` is the upper edge of the last bin; a zero range puts everything in bin 0
fn bin_counts(distances: &[f64], num_bins: usize, range: f64) -> Vec<f64> {
    let mut counts = vec![0.0; num_bins];
    for &d in distances {
        let bin = match range > 0.0 {
            true => ((d / range) * num_bins as f64).floor() as usize,
            false => 0,
        };
        counts[bin.min(num_bins - 1)] += 1.0;
    }
    counts
}
