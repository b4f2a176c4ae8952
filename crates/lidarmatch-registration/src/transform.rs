use lidarmatch_3d::{
    linalg::{matmul33, transform_point3d, transpose33},
    pointcloud::PointCloud,
    transforms::{rotation_matrix_to_vector, rotation_vector_to_matrix},
};

/// A rotation followed by a translation, mapping scan 1 coordinates into the
/// scan 2 frame as `R * p + t`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RigidTransform {
    /// Row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// Transform a single point.
    #[inline]
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        transform_point3d(point, &self.rotation, &self.translation)
    }

    /// Transform every point of a cloud.
    pub fn apply_cloud(&self, cloud: &PointCloud) -> PointCloud {
        PointCloud::new(cloud.points().iter().map(|p| self.apply(p)).collect())
    }

    /// The transform mapping scan 2 back into scan 1.
    pub fn inverse(&self) -> Self {
        let rotation = transpose33(&self.rotation);
        let t = transform_point3d(&self.translation, &rotation, &[0.0; 3]);
        Self {
            rotation,
            translation: [-t[0], -t[1], -t[2]],
        }
    }

    /// The transform applying `other` first, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> Self {
        Self {
            rotation: matmul33(&self.rotation, &other.rotation),
            translation: self.apply(&other.translation),
        }
    }

    /// The 6-DOF parameter vector `[rx, ry, rz, tx, ty, tz]`, where `r` is the
    /// rotation vector (axis scaled by angle).
    pub fn to_params(&self) -> [f64; 6] {
        let r = rotation_matrix_to_vector(&self.rotation);
        let t = self.translation;
        [r[0], r[1], r[2], t[0], t[1], t[2]]
    }

    /// Build a transform from a 6-DOF parameter vector, see
    /// [`RigidTransform::to_params`].
    pub fn from_params(params: &[f64; 6]) -> Self {
        Self {
            rotation: rotation_vector_to_matrix(&[params[0], params[1], params[2]]),
            translation: [params[3], params[4], params[5]],
        }
    }

    /// Rotation angle in radians.
    pub fn rotation_angle(&self) -> f64 {
        let r = rotation_matrix_to_vector(&self.rotation);
        (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt()
    }

    /// Length of the translation.
    pub fn translation_norm(&self) -> f64 {
        let t = self.translation;
        (t[0] * t[0] + t[1] * t[1] + t[2] * t[2]).sqrt()
    }
}
