use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::PathBuf, sync::Arc};

use lidarmatch::k3d::pointcloud::PointCloud;
use lidarmatch::registration::{Registration, RegistrationConfig, RigidTransform};

#[derive(FromArgs)]
/// Register a synthetic LiDAR scan against a moved copy of itself
struct Args {
    /// path to a JSON registration config, defaults are used if absent
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of points in the scan
    #[argh(option, default = "2000")]
    num_points: usize,

    /// rotation vector and translation of the ground truth as rx,ry,rz,tx,ty,tz
    #[argh(option, default = "String::from(\"0.02,-0.05,0.4,1.5,-0.8,0.1\")")]
    motion: String,

    /// uniform jitter in metres added to the second scan
    #[argh(option, default = "0.0")]
    jitter: f64,

    /// seed of the synthetic scene
    #[argh(option, default = "0")]
    seed: u64,

    /// path to write the estimated transform as JSON
    #[argh(option)]
    output: Option<PathBuf>,
}

#[derive(serde::Serialize)]
struct Summary {
    matches: usize,
    inliers: usize,
    params: [f64; 6],
    rotation_error: f64,
    translation_error: f64,
}

fn parse_motion(motion: &str) -> Result<[f64; 6], Box<dyn std::error::Error>> {
    let values = motion
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    let params: [f64; 6] = values
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected 6 motion values, got {}", v.len()))?;
    Ok(params)
}

// ground plane with a few boxes on it, roughly what a street scan looks like
fn synthetic_scan(num_points: usize, rng: &mut StdRng) -> PointCloud {
    let boxes = [
        ([4.0, 2.0, 0.0], [1.5, 2.5, 1.8]),
        ([-6.0, 5.0, 0.0], [3.0, 1.0, 2.5]),
        ([1.0, -7.0, 0.0], [0.6, 0.6, 3.5]),
    ];
    let points = (0..num_points)
        .map(|i| match i % 4 {
            0 => [
                rng.random_range(-15.0..15.0),
                rng.random_range(-15.0..15.0),
                rng.random_range(-0.05..0.05),
            ],
            k => {
                let (origin, size) = boxes[k - 1];
                [
                    origin[0] + rng.random_range(0.0..size[0]),
                    origin[1] + rng.random_range(0.0..size[1]),
                    origin[2] + rng.random_range(0.0..size[2]),
                ]
            }
        })
        .collect();
    PointCloud::new(points)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config: RegistrationConfig = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => RegistrationConfig::default(),
    };

    let ground_truth = RigidTransform::from_params(&parse_motion(&args.motion)?);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let scan1 = synthetic_scan(args.num_points, &mut rng);
    let moved = ground_truth.apply_cloud(&scan1);
    let scan2 = PointCloud::new(
        moved
            .points()
            .iter()
            .map(|p| match args.jitter > 0.0 {
                true => [
                    p[0] + rng.random_range(-args.jitter..args.jitter),
                    p[1] + rng.random_range(-args.jitter..args.jitter),
                    p[2] + rng.random_range(-args.jitter..args.jitter),
                ],
                false => *p,
            })
            .collect(),
    );
    println!("Scan 1: #{} points", scan1.len());
    println!("Scan 2: #{} points", scan2.len());

    let registration = Registration::new(config);
    let result = registration.register(Arc::new(scan1), Arc::new(scan2))?;

    // residual motion between the estimate and the ground truth
    let error = ground_truth.inverse().compose(&result.transform);
    let summary = Summary {
        matches: result.matches.len(),
        inliers: result.inliers.len(),
        params: result.transform.to_params(),
        rotation_error: error.rotation_angle(),
        translation_error: error.translation_norm(),
    };

    println!("Matches: {} ({} inliers)", summary.matches, summary.inliers);
    println!("Estimated params: {:?}", summary.params);
    println!(
        "Error: rotation {:.6} rad, translation {:.6} m",
        summary.rotation_error, summary.translation_error
    );

    if let Some(path) = args.output {
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        log::info!("Wrote summary to {}", path.display());
    }

    Ok(())
}
