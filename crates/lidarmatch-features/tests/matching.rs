use std::sync::Arc;

use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use lidarmatch_3d::{
    keypoints::KeypointIndexSet,
    linalg,
    pointcloud::PointCloud,
    spatial::{BruteForceIndex, IndexKind},
    transforms::axis_angle_to_rotation_matrix,
    PointCloudError,
};
use lidarmatch_features::{
    descriptor::candidate_pairs, match_descriptors, CorrelationMatcher, DescriptorMatchConfig,
    DescriptorSet, ExecutionStrategy, FeatureError, FeatureExtractor, HistogramConfig,
    MatchConfig, MatchPolicy, StrideExtractor,
};

fn rigid_copy(cloud: &PointCloud) -> Result<PointCloud, Box<dyn std::error::Error>> {
    let rotation = axis_angle_to_rotation_matrix(&[0.3, 0.5, 0.8], 0.7)?;
    let translation = [12.0, -4.0, 2.5];
    let mut points = vec![[0.0; 3]; cloud.len()];
    linalg::transform_points3d(cloud.points(), &rotation, &translation, &mut points)?;
    Ok(PointCloud::new(points))
}

// two clusters far apart: a regular line and a point with geometrically
// spaced neighbors
fn two_cluster_cloud() -> PointCloud {
    let mut points = (0..50).map(|i| [i as f64, 0.0, 0.0]).collect::<Vec<_>>();
    let base = [1000.0, 0.0, 0.0];
    points.push(base);
    for d in [1.0, 2.0, 4.0, 8.0, 16.0] {
        points.push([base[0] + d, 0.0, 0.0]);
    }
    for i in 0..44 {
        points.push([base[0], 40.0 + i as f64, 0.0]);
    }
    PointCloud::new(points)
}

fn random_cloud(num_points: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    PointCloud::new(
        (0..num_points)
            .map(|_| {
                [
                    rng.random_range(-10.0..10.0),
                    rng.random_range(-10.0..10.0),
                    rng.random_range(-10.0..10.0),
                ]
            })
            .collect(),
    )
}

fn matcher(near_points_num: usize) -> CorrelationMatcher {
    CorrelationMatcher::new(MatchConfig {
        histogram: HistogramConfig {
            near_points_num,
            ..Default::default()
        },
        ..Default::default()
    })
}

#[test]
fn within_cluster_correspondences_rank_first() -> Result<(), Box<dyn std::error::Error>> {
    let cloud1 = two_cluster_cloud();
    assert_eq!(cloud1.len(), 100);
    let cloud2 = rigid_copy(&cloud1)?;
    let keypoints = KeypointIndexSet::try_new(vec![0, 50], &cloud1)?;

    let matches = matcher(5).match_clouds(
        &keypoints,
        &keypoints,
        Arc::new(cloud1),
        Arc::new(cloud2),
        2,
    )?;

    assert_eq!(matches.len(), 2);
    // both true correspondences score 1 up to rounding, so their order is free
    let mut resolved = matches.resolve(&keypoints, &keypoints)?;
    resolved.sort_unstable();
    assert_eq!(resolved, vec![(0, 0), (50, 50)]);
    for m in matches.iter() {
        assert_eq!(m.idx1, m.idx2);
        assert_relative_eq!(m.relation, 1.0, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn cross_cluster_pairs_score_lower() -> Result<(), Box<dyn std::error::Error>> {
    let cloud1 = Arc::new(two_cluster_cloud());
    let cloud2 = Arc::new(rigid_copy(&cloud1)?);
    let keypoints = KeypointIndexSet::new(vec![0, 50]);

    let matches = matcher(5).match_clouds(&keypoints, &keypoints, cloud1, cloud2, 10)?;
    assert_eq!(matches.len(), 4);
    for m in matches.iter().filter(|m| m.idx1 != m.idx2) {
        assert!(m.relation < 0.99);
        assert!(m.relation > 0.9);
    }
    Ok(())
}

#[test]
fn rotation_invariance_on_random_cloud() -> Result<(), Box<dyn std::error::Error>> {
    let cloud1 = random_cloud(400, 42);
    let cloud2 = rigid_copy(&cloud1)?;
    let keypoints = (0..400).step_by(40).collect::<KeypointIndexSet>();

    let m = CorrelationMatcher::new(MatchConfig {
        histogram: HistogramConfig {
            near_points_num: 10,
            ..Default::default()
        },
        policy: MatchPolicy::OneToOne,
        ..Default::default()
    });
    let matches = m.match_clouds(
        &keypoints,
        &keypoints,
        Arc::new(cloud1),
        Arc::new(cloud2),
        keypoints.len(),
    )?;

    assert_eq!(matches.len(), keypoints.len());
    for record in matches.iter() {
        assert_eq!(record.idx1, record.idx2);
        assert_relative_eq!(record.relation, 1.0, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn self_correlation_is_one() -> Result<(), Box<dyn std::error::Error>> {
    let cloud = Arc::new(random_cloud(120, 3));
    let index = BruteForceIndex::new(cloud);
    let keypoints = KeypointIndexSet::new(vec![5, 17, 64]);

    let matches = matcher(8).match_keypoints(&keypoints, &keypoints, &index, &index, 9)?;
    assert_eq!(matches.len(), 9);
    assert!(matches.windows(2).all(|w| w[0].relation >= w[1].relation));
    for record in matches.iter().filter(|r| r.idx1 == r.idx2) {
        assert_relative_eq!(record.relation, 1.0, epsilon = 1e-12);
    }
    Ok(())
}

#[test]
fn more_neighbors_than_points() {
    let cloud = Arc::new(random_cloud(6, 1));
    let keypoints = KeypointIndexSet::new(vec![0, 1]);
    let res = matcher(10).match_clouds(&keypoints, &keypoints, cloud.clone(), cloud, 1);
    assert_eq!(
        res,
        Err(FeatureError::PointCloud(
            PointCloudError::InsufficientNeighbors {
                requested: 10,
                available: 5
            }
        ))
    );
}

#[test]
fn mismatched_descriptor_length() -> Result<(), Box<dyn std::error::Error>> {
    let d1 = DescriptorSet::from_rows(vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]])?;
    let d2 = DescriptorSet::from_rows(vec![vec![0.0, 1.0, 2.0, 3.0]])?;
    assert_eq!(
        match_descriptors(&d1, &d2, &DescriptorMatchConfig::default()),
        Err(FeatureError::DimensionMismatch {
            expected: 3,
            actual: 4
        })
    );
    Ok(())
}

#[test]
fn empty_inputs() -> Result<(), Box<dyn std::error::Error>> {
    let cloud = Arc::new(random_cloud(30, 9));
    let keypoints = KeypointIndexSet::new(vec![1, 2, 3]);
    let m = matcher(4);

    let none = m.match_clouds(&keypoints, &keypoints, cloud.clone(), cloud.clone(), 0)?;
    assert!(none.is_empty());

    let none = m.match_clouds(
        &KeypointIndexSet::default(),
        &keypoints,
        cloud.clone(),
        cloud.clone(),
        5,
    )?;
    assert!(none.is_empty());

    let empty = Arc::new(PointCloud::new(vec![]));
    assert!(matches!(
        m.match_clouds(&keypoints, &keypoints, empty, cloud, 5),
        Err(FeatureError::InvalidInput(_))
    ));
    Ok(())
}

#[test]
fn repeated_calls_and_strategies_agree() -> Result<(), Box<dyn std::error::Error>> {
    let cloud1 = Arc::new(random_cloud(250, 5));
    let cloud2 = Arc::new(random_cloud(250, 6));
    let keypoints = (0..250).step_by(7).collect::<KeypointIndexSet>();

    let run = |execution, index| {
        CorrelationMatcher::new(MatchConfig {
            histogram: HistogramConfig {
                near_points_num: 6,
                ..Default::default()
            },
            execution,
            index,
            ..Default::default()
        })
        .match_clouds(&keypoints, &keypoints, cloud1.clone(), cloud2.clone(), 20)
    };

    let reference = run(ExecutionStrategy::Serial, IndexKind::BruteForce)?;
    assert_eq!(reference.len(), 20);
    assert_eq!(reference, run(ExecutionStrategy::Serial, IndexKind::BruteForce)?);
    assert_eq!(reference, run(ExecutionStrategy::Parallel, IndexKind::KdTree)?);
    assert_eq!(reference, run(ExecutionStrategy::Fixed(2), IndexKind::KdTree)?);
    Ok(())
}

#[test]
fn one_to_one_never_repeats() -> Result<(), Box<dyn std::error::Error>> {
    let cloud1 = Arc::new(random_cloud(200, 21));
    let cloud2 = Arc::new(random_cloud(200, 22));
    let keypoints = (0..200).step_by(9).collect::<KeypointIndexSet>();

    let m = CorrelationMatcher::new(MatchConfig {
        histogram: HistogramConfig {
            near_points_num: 6,
            ..Default::default()
        },
        policy: MatchPolicy::OneToOne,
        ..Default::default()
    });
    let matches = m.match_clouds(&keypoints, &keypoints, cloud1, cloud2, 100)?;

    let mut seen1 = std::collections::HashSet::new();
    let mut seen2 = std::collections::HashSet::new();
    for record in matches.iter() {
        assert!(seen1.insert(record.idx1));
        assert!(seen2.insert(record.idx2));
    }
    assert_eq!(matches.len(), keypoints.len());
    Ok(())
}

#[test]
fn descriptor_prefilter_then_correlate() -> Result<(), Box<dyn std::error::Error>> {
    let cloud1 = Arc::new(random_cloud(300, 77));
    let cloud2 = Arc::new(rigid_copy(&cloud1)?);

    let extractor = StrideExtractor {
        stride: 25,
        offset: 0,
        histogram: HistogramConfig {
            near_points_num: 8,
            ..Default::default()
        },
    };
    let kp1 = extractor.extract_keypoints(&cloud1)?;
    let kp2 = extractor.extract_keypoints(&cloud2)?;
    let d1 = extractor.extract_descriptors(&cloud1, &kp1)?;
    let d2 = extractor.extract_descriptors(&cloud2, &kp2)?;

    let config = DescriptorMatchConfig {
        cross_check: true,
        ..Default::default()
    };
    let candidates = candidate_pairs(&match_descriptors(&d1, &d2, &config)?);
    assert_eq!(candidates.len(), kp1.len());
    assert!(candidates.iter().all(|&(i, j)| i == j));

    let index1 = BruteForceIndex::new(cloud1);
    let index2 = BruteForceIndex::new(cloud2);
    let matches = matcher(8).match_candidates(&kp1, &kp2, &index1, &index2, &candidates, 5)?;
    assert_eq!(matches.len(), 5);
    assert!(matches.iter().all(|m| m.idx1 == m.idx2));
    Ok(())
}

#[test]
fn match_config_from_json() -> Result<(), Box<dyn std::error::Error>> {
    let config: MatchConfig = serde_json::from_str(
        r#"{
            "histogram": { "near_points_num": 6, "binning": { "kind": "normalized", "num_bins": 4 } },
            "policy": "one_to_one",
            "execution": { "fixed": 2 },
            "index": "brute_force",
            "budget": { "max_pairs": 1000 }
        }"#,
    )?;
    assert_eq!(config.histogram.near_points_num, 6);
    assert_eq!(config.histogram.len(), 4);
    assert_eq!(config.policy, MatchPolicy::OneToOne);
    assert_eq!(config.execution, ExecutionStrategy::Fixed(2));
    assert_eq!(config.index, IndexKind::BruteForce);
    assert_eq!(config.budget.max_pairs, Some(1000));
    assert_eq!(config.budget.deadline, None);

    let defaults: MatchConfig = serde_json::from_str("{}")?;
    assert_eq!(defaults, MatchConfig::default());
    Ok(())
}
