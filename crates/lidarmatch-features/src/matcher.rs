use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use lidarmatch_3d::{
    keypoints::KeypointIndexSet,
    pointcloud::PointCloud,
    spatial::{IndexKind, SpatialIndex},
};

use crate::{
    correlation::correlation,
    histogram::{DistanceHistogram, HistogramConfig},
    topk::{rank_cmp, TopK},
    FeatureError,
};

/// A correspondence between two keypoints.
///
/// `idx1` and `idx2` are positions in the keypoint sets passed to the matcher,
/// not raw cloud indices. Use [`MatchRecord::resolve`] to get cloud indices.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchRecord {
    /// Position in the first keypoint set.
    pub idx1: usize,
    /// Position in the second keypoint set.
    pub idx2: usize,
    /// Correlation of the two distance histograms, higher is more similar.
    pub relation: f64,
}

impl MatchRecord {
    /// Map the keypoint positions to raw cloud indices.
    pub fn resolve(
        &self,
        keypoints1: &KeypointIndexSet,
        keypoints2: &KeypointIndexSet,
    ) -> Option<(usize, usize)> {
        Some((keypoints1.get(self.idx1)?, keypoints2.get(self.idx2)?))
    }
}

/// Matches sorted by descending relation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchList(Vec<MatchRecord>);

impl MatchList {
    /// The match records, best first.
    pub fn records(&self) -> &[MatchRecord] {
        &self.0
    }

    /// Consume the list, returning its records.
    pub fn into_vec(self) -> Vec<MatchRecord> {
        self.0
    }

    /// Map every record to raw cloud indices.
    pub fn resolve(
        &self,
        keypoints1: &KeypointIndexSet,
        keypoints2: &KeypointIndexSet,
    ) -> Result<Vec<(usize, usize)>, FeatureError> {
        self.0
            .iter()
            .map(|m| {
                m.resolve(keypoints1, keypoints2).ok_or_else(|| {
                    FeatureError::InvalidInput(format!(
                        "match ({}, {}) does not fit keypoint sets of {} and {}",
                        m.idx1,
                        m.idx2,
                        keypoints1.len(),
                        keypoints2.len()
                    ))
                })
            })
            .collect()
    }
}

impl From<Vec<MatchRecord>> for MatchList {
    /// Wrap records from another source, such as a stored match list, sorting
    /// them into rank order.
    fn from(mut records: Vec<MatchRecord>) -> Self {
        records.sort_by(rank_cmp);
        Self(records)
    }
}

impl std::ops::Deref for MatchList {
    type Target = [MatchRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for MatchList {
    type Item = MatchRecord;
    type IntoIter = std::vec::IntoIter<MatchRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Whether a keypoint may take part in more than one match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Keep the best pairs regardless of repeated keypoints.
    #[default]
    ManyToMany,
    /// Greedy assignment in rank order, each keypoint of either set used once.
    OneToOne,
}

/// Controls how the pair sweep is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Run sequentially on the current thread.
    Serial,
    /// Use the global Rayon thread pool.
    #[default]
    Parallel,
    /// Run on a local thread pool with `n` threads.
    ///
    /// Creates a new thread pool on every call.
    Fixed(usize),
}

impl ExecutionStrategy {
    // run `op` on the chosen pool; the flag tells it whether to use rayon
    // iterators
    pub(crate) fn run<T, F>(self, op: F) -> Result<T, FeatureError>
    where
        T: Send,
        F: FnOnce(bool) -> Result<T, FeatureError> + Send,
    {
        match self {
            ExecutionStrategy::Serial => op(false),
            ExecutionStrategy::Parallel => op(true),
            ExecutionStrategy::Fixed(0) => Err(FeatureError::InvalidInput(
                "thread count must be > 0".to_string(),
            )),
            ExecutionStrategy::Fixed(num_threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build()
                .map_err(|e| FeatureError::ThreadPool(e.to_string()))?
                .install(|| op(true)),
        }
    }
}

/// Limits on the cost of one match call.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchBudget {
    /// Maximum number of keypoint pairs to correlate.
    pub max_pairs: Option<usize>,
    /// Maximum wall time of the call.
    pub deadline: Option<Duration>,
}

/// Configuration of the [`CorrelationMatcher`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Per-keypoint histogram parameters.
    pub histogram: HistogramConfig,
    /// Whether keypoints may repeat across matches.
    pub policy: MatchPolicy,
    /// Serial or parallel execution.
    pub execution: ExecutionStrategy,
    /// Spatial index built by [`CorrelationMatcher::match_clouds`].
    pub index: IndexKind,
    /// Cost limits.
    pub budget: MatchBudget,
}

// Per-worker accumulator of the pair sweep.
struct Sweep {
    top: TopK,
    evaluated: usize,
    degenerate: usize,
}

impl Sweep {
    fn new(capacity: usize) -> Self {
        Self {
            top: TopK::new(capacity),
            evaluated: 0,
            degenerate: 0,
        }
    }

    fn merge(self, other: Sweep) -> Self {
        Self {
            top: self.top.merge(other.top),
            evaluated: self.evaluated + other.evaluated,
            degenerate: self.degenerate + other.degenerate,
        }
    }
}

/// Ranks keypoint pairs of two clouds by the correlation of their distance
/// histograms.
///
/// Example:
///
/// ```
/// use std::sync::Arc;
/// use lidarmatch_3d::{keypoints::KeypointIndexSet, pointcloud::PointCloud};
/// use lidarmatch_features::{CorrelationMatcher, HistogramConfig, MatchConfig};
///
/// let points = (0..20).map(|i| [i as f64, (i * i) as f64 * 0.1, 0.0]).collect::<Vec<_>>();
/// let cloud = Arc::new(PointCloud::new(points));
/// let keypoints = KeypointIndexSet::new(vec![2, 10, 17]);
///
/// let matcher = CorrelationMatcher::new(MatchConfig {
///     histogram: HistogramConfig { near_points_num: 4, ..Default::default() },
///     ..Default::default()
/// });
/// let matches = matcher
///     .match_clouds(&keypoints, &keypoints, cloud.clone(), cloud, 3)
///     .unwrap();
/// assert_eq!(matches.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CorrelationMatcher {
    config: MatchConfig,
}

impl CorrelationMatcher {
    /// Create a matcher with the given configuration.
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// The matcher configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match two keypoint sets, building the configured spatial index over
    /// each cloud first.
    pub fn match_clouds(
        &self,
        keypoints1: &KeypointIndexSet,
        keypoints2: &KeypointIndexSet,
        cloud1: Arc<PointCloud>,
        cloud2: Arc<PointCloud>,
        match_num: usize,
    ) -> Result<MatchList, FeatureError> {
        let index1 = self.config.index.build(cloud1);
        let index2 = self.config.index.build(cloud2);
        self.match_keypoints(
            keypoints1,
            keypoints2,
            index1.as_ref(),
            index2.as_ref(),
            match_num,
        )
    }

    /// Find the `match_num` keypoint pairs with the highest histogram
    /// correlation.
    ///
    /// # Arguments
    ///
    /// * `keypoints1` - Keypoints of the first cloud.
    /// * `keypoints2` - Keypoints of the second cloud.
    /// * `index1` - Spatial index over the first cloud.
    /// * `index2` - Spatial index over the second cloud.
    /// * `match_num` - Maximum number of matches to return.
    ///
    /// # Returns
    ///
    /// At most `match_num` records sorted by descending relation. Equal
    /// relations are ordered by `idx1`, then `idx2`. Pairs involving a
    /// zero-variance histogram have no correlation and are left out.
    ///
    /// # Errors
    ///
    /// [`FeatureError::InvalidInput`] if a cloud is empty or a keypoint lies
    /// outside its cloud, a wrapped `InsufficientNeighbors` if a cloud is too
    /// small for the histogram, and the budget errors when a limit is hit.
    pub fn match_keypoints(
        &self,
        keypoints1: &KeypointIndexSet,
        keypoints2: &KeypointIndexSet,
        index1: &dyn SpatialIndex,
        index2: &dyn SpatialIndex,
        match_num: usize,
    ) -> Result<MatchList, FeatureError> {
        self.check_inputs(keypoints1, keypoints2, index1, index2)?;
        if match_num == 0 || keypoints1.is_empty() || keypoints2.is_empty() {
            return Ok(MatchList::default());
        }
        self.check_pair_budget(keypoints1.len().saturating_mul(keypoints2.len()))?;

        let start = Instant::now();
        let histograms1 = self.histograms(index1, keypoints1)?;
        let histograms2 = self.histograms(index2, keypoints2)?;
        log::debug!(
            "Computed {} + {} histograms in {:?}",
            histograms1.len(),
            histograms2.len(),
            start.elapsed()
        );

        let cols = (0..histograms2.len()).collect::<Vec<_>>();
        let rows = (0..histograms1.len())
            .map(|i| (i, cols.as_slice()))
            .collect::<Vec<_>>();
        self.select(&histograms1, &histograms2, &rows, match_num, start)
    }

    /// Like [`CorrelationMatcher::match_keypoints`], but only correlates the
    /// given `(position1, position2)` candidate pairs, for instance those kept
    /// by [`crate::descriptor::match_descriptors`].
    pub fn match_candidates(
        &self,
        keypoints1: &KeypointIndexSet,
        keypoints2: &KeypointIndexSet,
        index1: &dyn SpatialIndex,
        index2: &dyn SpatialIndex,
        candidates: &[(usize, usize)],
        match_num: usize,
    ) -> Result<MatchList, FeatureError> {
        self.check_inputs(keypoints1, keypoints2, index1, index2)?;
        if let Some(&(i, j)) = candidates
            .iter()
            .find(|&&(i, j)| i >= keypoints1.len() || j >= keypoints2.len())
        {
            return Err(FeatureError::InvalidInput(format!(
                "candidate ({i}, {j}) does not fit keypoint sets of {} and {}",
                keypoints1.len(),
                keypoints2.len()
            )));
        }
        if match_num == 0 || candidates.is_empty() {
            return Ok(MatchList::default());
        }

        // group by first position, dropping repeated pairs
        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &(i, j) in candidates {
            grouped.entry(i).or_default().push(j);
        }
        for cols in grouped.values_mut() {
            cols.sort_unstable();
            cols.dedup();
        }
        self.check_pair_budget(grouped.values().map(Vec::len).sum())?;

        // histograms only for positions that take part in a candidate; the
        // compact numbering keeps the original order, so ranks are unchanged
        let positions1 = grouped.keys().copied().collect::<Vec<_>>();
        let mut positions2 = grouped.values().flatten().copied().collect::<Vec<_>>();
        positions2.sort_unstable();
        positions2.dedup();
        let compact2 = positions2
            .iter()
            .enumerate()
            .map(|(c, &j)| (j, c))
            .collect::<BTreeMap<_, _>>();

        let start = Instant::now();
        let histograms1 = self.histograms(index1, &keypoints1.select(&positions1)?)?;
        let histograms2 = self.histograms(index2, &keypoints2.select(&positions2)?)?;
        log::debug!(
            "Computed {} + {} histograms for {} candidate rows",
            histograms1.len(),
            histograms2.len(),
            grouped.len()
        );

        let compact_cols = grouped
            .values()
            .map(|cols| cols.iter().map(|j| compact2[j]).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let rows = compact_cols
            .iter()
            .enumerate()
            .map(|(c, cols)| (c, cols.as_slice()))
            .collect::<Vec<_>>();
        let matches = self.select(&histograms1, &histograms2, &rows, match_num, start)?;

        Ok(matches
            .into_iter()
            .map(|r| MatchRecord {
                idx1: positions1[r.idx1],
                idx2: positions2[r.idx2],
                relation: r.relation,
            })
            .collect::<Vec<_>>()
            .into())
    }

    /// Rank pairs of precomputed histograms.
    ///
    /// Lets callers reuse the histograms of a keypoint set across several match
    /// calls. Both slices must be built with the same [`HistogramConfig`].
    pub fn match_histograms(
        &self,
        histograms1: &[DistanceHistogram],
        histograms2: &[DistanceHistogram],
        match_num: usize,
    ) -> Result<MatchList, FeatureError> {
        if match_num == 0 || histograms1.is_empty() || histograms2.is_empty() {
            return Ok(MatchList::default());
        }
        self.check_pair_budget(histograms1.len().saturating_mul(histograms2.len()))?;

        let cols = (0..histograms2.len()).collect::<Vec<_>>();
        let rows = (0..histograms1.len())
            .map(|i| (i, cols.as_slice()))
            .collect::<Vec<_>>();
        self.select(histograms1, histograms2, &rows, match_num, Instant::now())
    }

    /// Compute the distance histogram of every keypoint, in keypoint order.
    pub fn histograms(
        &self,
        index: &dyn SpatialIndex,
        keypoints: &KeypointIndexSet,
    ) -> Result<Vec<DistanceHistogram>, FeatureError> {
        let config = &self.config.histogram;
        config.validate()?;
        self.config.execution.run(|parallel| match parallel {
            true => keypoints
                .indices()
                .par_iter()
                .map(|&kp| DistanceHistogram::compute(index, kp, config))
                .collect(),
            false => keypoints
                .iter()
                .map(|&kp| DistanceHistogram::compute(index, kp, config))
                .collect(),
        })
    }

    fn check_inputs(
        &self,
        keypoints1: &KeypointIndexSet,
        keypoints2: &KeypointIndexSet,
        index1: &dyn SpatialIndex,
        index2: &dyn SpatialIndex,
    ) -> Result<(), FeatureError> {
        for (name, keypoints, cloud) in [
            ("1", keypoints1, index1.cloud()),
            ("2", keypoints2, index2.cloud()),
        ] {
            if cloud.is_empty() {
                return Err(FeatureError::InvalidInput(format!("cloud {name} is empty")));
            }
            keypoints
                .validate(cloud)
                .map_err(|e| FeatureError::InvalidInput(format!("keypoints {name}: {e}")))?;
        }
        self.config.histogram.validate()
    }

    fn check_pair_budget(&self, pairs: usize) -> Result<(), FeatureError> {
        match self.config.budget.max_pairs {
            Some(max_pairs) if pairs > max_pairs => {
                log::warn!("Refusing to correlate {pairs} pairs, limit is {max_pairs}");
                Err(FeatureError::PairBudgetExceeded { pairs, max_pairs })
            }
            _ => Ok(()),
        }
    }

    fn check_deadline(&self, start: Instant) -> Result<(), FeatureError> {
        match self.config.budget.deadline {
            Some(limit) => {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    return Err(FeatureError::DeadlineExceeded { elapsed, limit });
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn sweep_row(
        &self,
        mut sweep: Sweep,
        (i, cols): (usize, &[usize]),
        histograms1: &[DistanceHistogram],
        histograms2: &[DistanceHistogram],
        start: Instant,
    ) -> Result<Sweep, FeatureError> {
        self.check_deadline(start)?;
        let h1 = &histograms1[i];
        for &j in cols {
            sweep.evaluated += 1;
            match correlation(h1, &histograms2[j]) {
                Ok(relation) => sweep.top.push(MatchRecord {
                    idx1: i,
                    idx2: j,
                    relation,
                }),
                Err(FeatureError::DegenerateHistogram) => sweep.degenerate += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(sweep)
    }

    fn select(
        &self,
        histograms1: &[DistanceHistogram],
        histograms2: &[DistanceHistogram],
        rows: &[(usize, &[usize])],
        match_num: usize,
        start: Instant,
    ) -> Result<MatchList, FeatureError> {
        // one-to-one assignment needs every candidate, not only the best few
        let capacity = match self.config.policy {
            MatchPolicy::ManyToMany => match_num,
            MatchPolicy::OneToOne => usize::MAX,
        };

        let sweep = self.config.execution.run(|parallel| match parallel {
            true => rows
                .par_iter()
                .try_fold(
                    || Sweep::new(capacity),
                    |sweep, &row| self.sweep_row(sweep, row, histograms1, histograms2, start),
                )
                .try_reduce(|| Sweep::new(capacity), |a, b| Ok(a.merge(b))),
            false => rows.iter().try_fold(Sweep::new(capacity), |sweep, &row| {
                self.sweep_row(sweep, row, histograms1, histograms2, start)
            }),
        })?;

        log::debug!(
            "Correlated {} pairs ({} degenerate) in {:?}",
            sweep.evaluated,
            sweep.degenerate,
            start.elapsed()
        );

        let ranked = sweep.top.into_sorted_vec();
        let records = match self.config.policy {
            MatchPolicy::ManyToMany => ranked,
            MatchPolicy::OneToOne => assign_one_to_one(ranked, match_num),
        };
        debug_assert!(records
            .windows(2)
            .all(|w| rank_cmp(&w[0], &w[1]).is_lt()));

        Ok(MatchList(records))
    }
}

// greedy assignment over records sorted best first
fn assign_one_to_one(ranked: Vec<MatchRecord>, match_num: usize) -> Vec<MatchRecord> {
    let mut used1 = std::collections::HashSet::new();
    let mut used2 = std::collections::HashSet::new();
    let mut records = Vec::with_capacity(match_num.min(ranked.len()));
    for record in ranked {
        if records.len() == match_num {
            break;
        }
        if used1.contains(&record.idx1) || used2.contains(&record.idx2) {
            continue;
        }
        used1.insert(record.idx1);
        used2.insert(record.idx2);
        records.push(record);
    }
    records
}
