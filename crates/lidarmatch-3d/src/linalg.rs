/// Error raised when a linear algebra routine gets buffers of the wrong size.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("source ({src_len}) and destination ({dst_len}) must have the same number of points")]
pub struct LinalgError {
    /// Length of the source buffer.
    pub src_len: usize,
    /// Length of the destination buffer.
    pub dst_len: usize,
}

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use lidarmatch_3d::linalg::transform_points3d;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [0.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points3d(&src_points, &rotation, &translation, &mut dst_points).unwrap();
/// ```
pub fn transform_points3d(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) -> Result<(), LinalgError> {
    if src_points.len() != dst_points.len() {
        return Err(LinalgError {
            src_len: src_points.len(),
            dst_len: dst_points.len(),
        });
    }

    for (src, dst) in src_points.iter().zip(dst_points.iter_mut()) {
        *dst = transform_point3d(src, dst_r_src, dst_t_src);
    }

    Ok(())
}

/// Transform a single point as `R * p + t`.
#[inline]
pub fn transform_point3d(
    point: &[f64; 3],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
) -> [f64; 3] {
    let mut out = *dst_t_src;
    for (i, row) in dst_r_src.iter().enumerate() {
        out[i] += row[0] * point[0] + row[1] * point[1] + row[2] * point[2];
    }
    out
}

/// Multiply two 3x3 matrices as `a * b`.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut m = [[0.0; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    m
}

/// Transpose a 3x3 matrix.
pub fn transpose33(a: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    [
        [a[0][0], a[1][0], a[2][0]],
        [a[0][1], a[1][1], a[2][1]],
        [a[0][2], a[1][2], a[2][2]],
    ]
}

/// Determinant of a 3x3 matrix.
pub fn det33(a: &[[f64; 3]; 3]) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_points_identity() -> Result<(), LinalgError> {
        let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
        let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let translation = [0.0, 0.0, 0.0];
        let mut dst_points = vec![[0.0; 3]; src_points.len()];
        transform_points3d(&src_points, &rotation, &translation, &mut dst_points)?;

        assert_eq!(dst_points, src_points);
        Ok(())
    }

    #[test]
    fn test_transform_points_roundtrip() -> Result<(), LinalgError> {
        let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
        let rotation = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        let translation = [1.0, 2.0, 3.0];

        let mut dst_points = vec![[0.0; 3]; src_points.len()];
        transform_points3d(&src_points, &rotation, &translation, &mut dst_points)?;

        // R' = R^T, t' = -R^T * t
        let rotation_inv = transpose33(&rotation);
        let t = transform_point3d(&translation, &rotation_inv, &[0.0; 3]);
        let translation_inv = [-t[0], -t[1], -t[2]];

        let mut dst_points_src = vec![[0.0; 3]; dst_points.len()];
        transform_points3d(
            &dst_points,
            &rotation_inv,
            &translation_inv,
            &mut dst_points_src,
        )?;

        for (res, exp) in dst_points_src.iter().zip(src_points.iter()) {
            for (r, e) in res.iter().zip(exp.iter()) {
                assert_relative_eq!(r, e, epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_transform_points_size_mismatch() {
        let mut dst = vec![[0.0; 3]; 1];
        let res = transform_points3d(&[[0.0; 3]; 2], &[[0.0; 3]; 3], &[0.0; 3], &mut dst);
        assert_eq!(
            res,
            Err(LinalgError {
                src_len: 2,
                dst_len: 1
            })
        );
    }

    #[test]
    fn test_matmul_det() {
        let a = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let a2 = matmul33(&a, &a);
        assert_eq!(a2, [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(matmul33(&a, &transpose33(&a)), [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_relative_eq!(det33(&a), 1.0);
    }
}
