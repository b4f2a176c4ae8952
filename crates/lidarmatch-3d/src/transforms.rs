use crate::PointCloudError;

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix.
///
/// Example:
///
/// ```
/// use lidarmatch_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], PointCloudError> {
    // normalize the vector
    let axis_norm = {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        match magnitude < 1e-10 {
            true => return Err(PointCloudError::InvalidAxis),
            false => [
                axis[0] / magnitude,
                axis[1] / magnitude,
                axis[2] / magnitude,
            ],
        }
    };

    let x = axis_norm[0];
    let y = axis_norm[1];
    let z = axis_norm[2];

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;

    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;

    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;

    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Ok([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}

/// Convert a rotation vector (axis scaled by angle) into a rotation matrix.
///
/// A zero vector maps to the identity.
pub fn rotation_vector_to_matrix(rvec: &[f64; 3]) -> [[f64; 3]; 3] {
    let angle = (rvec[0].powi(2) + rvec[1].powi(2) + rvec[2].powi(2)).sqrt();
    axis_angle_to_rotation_matrix(rvec, angle)
        .unwrap_or([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
}

/// Convert a rotation matrix into a rotation vector (axis scaled by angle).
///
/// PRECONDITION: `rotation` is orthonormal with determinant 1.
pub fn rotation_matrix_to_vector(rotation: &[[f64; 3]; 3]) -> [f64; 3] {
    let r = rotation;
    let trace = r[0][0] + r[1][1] + r[2][2];
    let cos = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0);
    let angle = cos.acos();

    if angle < 1e-12 {
        return [0.0; 3];
    }

    let sin = angle.sin();
    if sin > 1e-6 {
        let scale = angle / (2.0 * sin);
        return [
            (r[2][1] - r[1][2]) * scale,
            (r[0][2] - r[2][0]) * scale,
            (r[1][0] - r[0][1]) * scale,
        ];
    }

    // angle close to pi: recover the axis from the symmetric part
    let k = (0..3)
        .max_by(|&a, &b| r[a][a].total_cmp(&r[b][b]))
        .unwrap_or(0);
    let vk = ((r[k][k] + 1.0) / 2.0).max(0.0).sqrt();
    let mut axis = [0.0; 3];
    for (j, val) in axis.iter_mut().enumerate() {
        *val = if j == k {
            vk
        } else {
            (r[j][k] + r[k][j]) / (4.0 * vk)
        };
    }
    [axis[0] * angle, axis[1] * angle, axis[2] * angle]
}
