use crate::{histogram::DistanceHistogram, FeatureError};

/// Pearson correlation coefficient between two distance histograms.
///
/// Each histogram is centred on its own mean, the covariance of the paired
/// buckets is divided by the product of both standard deviations. `1.0` means
/// the local shapes match, values near `0.0` or below mean they do not.
///
/// # Arguments
///
/// * `h1` - Histogram of a keypoint in the first cloud.
/// * `h2` - Histogram of a keypoint in the second cloud.
///
/// # Returns
///
/// The coefficient, clamped to `[-1, 1]`.
///
/// # Errors
///
/// [`FeatureError::DimensionMismatch`] if the lengths differ and
/// [`FeatureError::DegenerateHistogram`] if either histogram has zero variance.
///
/// Example:
///
/// ```
/// use lidarmatch_features::{correlation, DistanceHistogram};
///
/// let h1 = DistanceHistogram::from_values(vec![1.0, 2.0, 3.0]);
/// let h2 = DistanceHistogram::from_values(vec![2.0, 4.0, 6.0]);
/// let r = correlation(&h1, &h2).unwrap();
/// assert!((r - 1.0).abs() < 1e-12);
/// ```
pub fn correlation(h1: &DistanceHistogram, h2: &DistanceHistogram) -> Result<f64, FeatureError> {
    pearson(h1.as_slice(), h2.as_slice())
}

pub(crate) fn pearson(data1: &[f64], data2: &[f64]) -> Result<f64, FeatureError> {
    if data1.len() != data2.len() {
        return Err(FeatureError::DimensionMismatch {
            expected: data1.len(),
            actual: data2.len(),
        });
    }
    if data1.is_empty() {
        return Err(FeatureError::DegenerateHistogram);
    }

    let n = data1.len() as f64;
    let mean1 = data1.iter().sum::<f64>() / n;
    let mean2 = data2.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut ss1 = 0.0;
    let mut ss2 = 0.0;
    for (a, b) in data1.iter().zip(data2.iter()) {
        let da = a - mean1;
        let db = b - mean2;
        cov += da * db;
        ss1 += da * da;
        ss2 += db * db;
    }

    // constant buckets still leave rounding residue around the mean
    if is_flat(ss1, data1) || is_flat(ss2, data2) {
        return Err(FeatureError::DegenerateHistogram);
    }

    let r = cov / (ss1.sqrt() * ss2.sqrt());
    if !r.is_finite() {
        return Err(FeatureError::DegenerateHistogram);
    }
    Ok(r.clamp(-1.0, 1.0))
}

fn is_flat(sum_sq_dev: f64, data: &[f64]) -> bool {
    let energy = data.iter().map(|v| v * v).sum::<f64>();
    sum_sq_dev <= f64::EPSILON * energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hist(values: &[f64]) -> DistanceHistogram {
        DistanceHistogram::from_values(values.to_vec())
    }

    #[test]
    fn test_self_correlation() -> Result<(), FeatureError> {
        let h = hist(&[0.3, 1.7, 2.2, 5.0, 5.1]);
        assert_relative_eq!(correlation(&h, &h)?, 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_anti_and_partial_correlation() -> Result<(), FeatureError> {
        let h1 = hist(&[1.0, 2.0, 3.0, 4.0]);
        let h2 = hist(&[8.0, 6.0, 4.0, 2.0]);
        assert_relative_eq!(correlation(&h1, &h2)?, -1.0, epsilon = 1e-12);

        // shift and scale do not matter
        let h3 = hist(&[10.0, 30.0, 50.0, 70.0]);
        assert_relative_eq!(correlation(&h1, &h3)?, 1.0, epsilon = 1e-12);

        let h4 = hist(&[1.0, 2.0, 4.0, 8.0]);
        let r = correlation(&h1, &h4)?;
        assert!(r > 0.9 && r < 1.0 - 1e-6);
        Ok(())
    }

    #[test]
    fn test_degenerate() {
        let flat = hist(&[0.1, 0.1, 0.1]);
        let ramp = hist(&[1.0, 2.0, 3.0]);
        assert_eq!(correlation(&flat, &ramp), Err(FeatureError::DegenerateHistogram));
        assert_eq!(correlation(&ramp, &flat), Err(FeatureError::DegenerateHistogram));
        assert_eq!(
            correlation(&hist(&[]), &hist(&[])),
            Err(FeatureError::DegenerateHistogram)
        );
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            correlation(&hist(&[1.0, 2.0]), &hist(&[1.0, 2.0, 3.0])),
            Err(FeatureError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }
}
