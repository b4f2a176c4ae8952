use rayon::prelude::*;

use crate::{matcher::ExecutionStrategy, FeatureError};

/// A set of fixed-length descriptor vectors stored row-major.
///
/// Row `i` describes the keypoint at position `i` of the matching
/// [`lidarmatch_3d::keypoints::KeypointIndexSet`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorSet {
    dim: usize,
    data: Vec<f64>,
}

impl DescriptorSet {
    /// Create a descriptor set from flat row-major data.
    ///
    /// # Errors
    ///
    /// Fails if `dim` is zero while data is given, or if `data` does not hold a
    /// whole number of rows.
    pub fn new(dim: usize, data: Vec<f64>) -> Result<Self, FeatureError> {
        if dim == 0 {
            return match data.is_empty() {
                true => Ok(Self::default()),
                false => Err(FeatureError::InvalidInput(
                    "descriptor dimension must be > 0".to_string(),
                )),
            };
        }
        if data.len() % dim != 0 {
            return Err(FeatureError::InvalidInput(format!(
                "{} values do not split into rows of {}",
                data.len(),
                dim
            )));
        }
        Ok(Self { dim, data })
    }

    /// Create a descriptor set from individual rows, which must share a length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, FeatureError> {
        let dim = rows.first().map_or(0, |r| r.len());
        if dim == 0 && !rows.is_empty() {
            return Err(FeatureError::InvalidInput(
                "descriptor dimension must be > 0".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(dim * rows.len());
        for row in rows {
            if row.len() != dim {
                return Err(FeatureError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self { dim, data })
    }

    /// Create a descriptor set from fixed-size single precision arrays, such
    /// as 33-bin FPFH signatures.
    pub fn from_arrays<const N: usize>(rows: &[[f32; N]]) -> Self {
        let data = rows
            .iter()
            .flat_map(|r| r.iter().map(|&v| v as f64))
            .collect();
        Self {
            dim: if rows.is_empty() { 0 } else { N },
            data,
        }
    }

    /// Length of every descriptor.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        match self.dim {
            0 => 0,
            dim => self.data.len() / dim,
        }
    }

    /// Whether the set holds no descriptors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The descriptor at position `index`.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Iterate over the descriptors in order.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Append a descriptor.
    pub fn push(&mut self, row: &[f64]) -> Result<(), FeatureError> {
        if self.is_empty() && self.dim == 0 {
            if row.is_empty() {
                return Err(FeatureError::InvalidInput(
                    "descriptor dimension must be > 0".to_string(),
                ));
            }
            self.dim = row.len();
        }
        if row.len() != self.dim {
            return Err(FeatureError::DimensionMismatch {
                expected: self.dim,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }
}

/// Distance used to compare two descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// Squared L2 distance.
    SquaredEuclidean,
    /// L1 distance.
    Manhattan,
    /// Chi-squared distance, suited to histogram descriptors such as FPFH.
    ChiSquared,
}

impl DescriptorMetric {
    /// Distance between two descriptors of equal length.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let pairs = a.iter().zip(b.iter());
        match self {
            DescriptorMetric::Euclidean => pairs.map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt(),
            DescriptorMetric::SquaredEuclidean => pairs.map(|(x, y)| (x - y).powi(2)).sum(),
            DescriptorMetric::Manhattan => pairs.map(|(x, y)| (x - y).abs()).sum(),
            DescriptorMetric::ChiSquared => {
                0.5 * pairs
                    .filter(|(x, y)| (*x + *y).abs() > f64::EPSILON)
                    .map(|(x, y)| (x - y).powi(2) / (x + y).abs())
                    .sum::<f64>()
            }
        }
    }
}

/// Configuration for brute-force descriptor matching.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DescriptorMatchConfig {
    /// Distance between descriptors.
    pub metric: DescriptorMetric,
    /// Reject matches whose nearest distance exceeds this threshold.
    pub max_distance: Option<f64>,
    /// Keep only mutual nearest neighbors.
    pub cross_check: bool,
    /// Lowe's ratio test: keep a match only if best / second-best < ratio.
    ///
    /// A best match tied with the second best is always rejected.
    pub max_ratio: Option<f64>,
    /// Thread pool used for the nearest-neighbor passes.
    pub execution: ExecutionStrategy,
}

impl Default for DescriptorMatchConfig {
    fn default() -> Self {
        Self {
            metric: DescriptorMetric::Euclidean,
            max_distance: None,
            cross_check: false,
            max_ratio: None,
            execution: ExecutionStrategy::Parallel,
        }
    }
}

/// Match descriptors using brute-force nearest neighbor search.
///
/// For each descriptor in `descriptors1`, finds the nearest neighbor in
/// `descriptors2`. Equal distances resolve to the smaller index.
///
/// # Arguments
///
/// * `descriptors1` - First set of descriptors.
/// * `descriptors2` - Second set of descriptors.
/// * `config` - Metric and rejection filters.
///
/// # Returns
///
/// A vector of length `descriptors1.len()` holding, per position, the index of
/// the matched descriptor in `descriptors2`, or `None` if the match was rejected.
///
/// # Errors
///
/// [`FeatureError::EmptyInput`] if either set is empty and
/// [`FeatureError::DimensionMismatch`] if the descriptor lengths differ.
pub fn match_descriptors(
    descriptors1: &DescriptorSet,
    descriptors2: &DescriptorSet,
    config: &DescriptorMatchConfig,
) -> Result<Vec<Option<usize>>, FeatureError> {
    if descriptors1.is_empty() || descriptors2.is_empty() {
        return Err(FeatureError::EmptyInput);
    }
    if descriptors1.dim() != descriptors2.dim() {
        return Err(FeatureError::DimensionMismatch {
            expected: descriptors1.dim(),
            actual: descriptors2.dim(),
        });
    }

    let metric = config.metric;
    let rows1 = descriptors1.rows().collect::<Vec<_>>();
    let rows2 = descriptors2.rows().collect::<Vec<_>>();

    let (forward, reverse) = config.execution.run(|parallel| {
        // best and second-best match in descriptors2
        let forward = match parallel {
            true => rows1
                .par_iter()
                .map(|d1| nearest_two(metric, d1, &rows2))
                .collect::<Vec<_>>(),
            false => rows1
                .iter()
                .map(|d1| nearest_two(metric, d1, &rows2))
                .collect::<Vec<_>>(),
        };

        // reverse pass, only needed for the cross check
        let reverse = match (config.cross_check, parallel) {
            (false, _) => None,
            (true, true) => Some(
                rows2
                    .par_iter()
                    .map(|d2| nearest_two(metric, d2, &rows1).0)
                    .collect::<Vec<_>>(),
            ),
            (true, false) => Some(
                rows2
                    .iter()
                    .map(|d2| nearest_two(metric, d2, &rows1).0)
                    .collect::<Vec<_>>(),
            ),
        };
        Ok((forward, reverse))
    })?;

    let matches = forward
        .into_iter()
        .enumerate()
        .map(|(i, (j, best_dist, second_dist))| {
            if config.max_distance.is_some_and(|max| best_dist > max) {
                return None;
            }

            if reverse.as_ref().is_some_and(|rev| rev[j] != i) {
                return None;
            }

            // second_dist > best_dist >= 0 once the tie is ruled out
            if let Some(ratio) = config.max_ratio {
                if best_dist >= second_dist || best_dist / second_dist >= ratio {
                    return None;
                }
            }

            Some(j)
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Descriptor matching kept {}/{} matches",
        matches.iter().filter(|m| m.is_some()).count(),
        matches.len()
    );

    Ok(matches)
}

// index and distance of the nearest row, and the second-smallest distance;
// the first of equally distant rows wins
fn nearest_two(metric: DescriptorMetric, query: &[f64], rows: &[&[f64]]) -> (usize, f64, f64) {
    let mut best_j = 0usize;
    let mut best_dist = f64::INFINITY;
    let mut second_dist = f64::INFINITY;
    for (j, row) in rows.iter().enumerate() {
        let dist = metric.distance(query, row);
        if dist < best_dist {
            second_dist = best_dist;
            best_dist = dist;
            best_j = j;
        } else if dist < second_dist {
            second_dist = dist;
        }
    }
    (best_j, best_dist, second_dist)
}

/// Turn index-aligned descriptor matches into explicit `(position1, position2)`
/// candidate pairs, dropping rejected positions.
pub fn candidate_pairs(matches: &[Option<usize>]) -> Vec<(usize, usize)> {
    matches
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.map(|j| (i, j)))
        .collect()
}
