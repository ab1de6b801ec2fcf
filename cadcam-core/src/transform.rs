//! Affine transform composition and application
//!
//! Coordinate contract: right-handed, Y-up, meters and radians. A local
//! transform resolves to `T · Rz · Ry · Rx · S`, i.e. scale first, then
//! rotation about X, then Y, then Z, then translation.

use std::f32::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::geometry::Mesh;

/// Coordinate axis, used for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        })
    }
}

/// Wrap an angle into [-π, π). Angles already in range come back unchanged.
pub fn wrap_angle(angle: f32) -> f32 {
    if (-PI..PI).contains(&angle) {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can round up to TAU
    if wrapped >= PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Rotation state around three axes (in radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl RotationState {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotate by delta amounts (in radians), wrapping each angle into [-π, π)
    pub fn rotate(&mut self, dx: f32, dy: f32, dz: f32) {
        self.x = wrap_angle(self.x + dx);
        self.y = wrap_angle(self.y + dy);
        self.z = wrap_angle(self.z + dz);
    }

    /// Same rotation with every angle wrapped into [-π, π)
    pub fn wrapped(self) -> Self {
        Self::new(wrap_angle(self.x), wrap_angle(self.y), wrap_angle(self.z))
    }

    pub fn as_vector(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::zero()
    }
}

/// Position, Euler rotation and non-uniform scale of one shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTransform {
    pub position: Vector3<f32>,
    pub rotation: RotationState,
    pub scale: Vector3<f32>,
}

impl LocalTransform {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: RotationState::zero(),
            scale: Vector3::repeat(1.0),
        }
    }

    pub fn from_position(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            ..Self::identity()
        }
    }

    /// Reject non-finite components and zero scale factors
    pub fn validate(&self) -> Result<(), TransformError> {
        check_finite("position", &self.position)?;
        check_finite("rotation", &self.rotation.as_vector())?;
        check_finite("scale", &self.scale)?;
        for axis in Axis::ALL {
            if self.scale[axis.index()] == 0.0 {
                return Err(TransformError::ZeroScale { axis });
            }
        }
        Ok(())
    }
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

fn check_finite(field: &'static str, v: &Vector3<f32>) -> Result<(), TransformError> {
    match v.iter().find(|c| !c.is_finite()) {
        Some(&value) => Err(TransformError::NonFinite { field, value }),
        None => Ok(()),
    }
}

/// Incremental transform request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Delta is added to the position
    Translate,
    /// Delta is added to the Euler angles
    Rotate,
    /// Delta multiplies the scale componentwise
    Scale,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransformKind::Translate => "translate",
            TransformKind::Rotate => "rotate",
            TransformKind::Scale => "scale",
        })
    }
}

impl FromStr for TransformKind {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "translate" => Ok(TransformKind::Translate),
            "rotate" => Ok(TransformKind::Rotate),
            "scale" => Ok(TransformKind::Scale),
            other => Err(TransformError::UnknownKind {
                name: other.to_string(),
            }),
        }
    }
}

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Create a rotation matrix from a rotation state
    pub fn rotation_matrix(rotation: &RotationState) -> Matrix4<f32> {
        let rx = Matrix4::new_rotation(Vector3::new(rotation.x, 0.0, 0.0));
        let ry = Matrix4::new_rotation(Vector3::new(0.0, rotation.y, 0.0));
        let rz = Matrix4::new_rotation(Vector3::new(0.0, 0.0, rotation.z));

        // X is applied first, Z last
        rz * ry * rx
    }

    /// Create a translation matrix
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Create a scale matrix
    pub fn scale_matrix(sx: f32, sy: f32, sz: f32) -> Matrix4<f32> {
        Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
    }

    /// Build the local-to-world matrix `T · Rz · Ry · Rx · S`
    pub fn compose(transform: &LocalTransform) -> Matrix4<f32> {
        let p = transform.position;
        let s = transform.scale;
        Self::translation_matrix(p.x, p.y, p.z)
            * Self::rotation_matrix(&transform.rotation)
            * Self::scale_matrix(s.x, s.y, s.z)
    }

    /// Inverse-transpose of the linear part, used to carry normals.
    ///
    /// A linear part too close to singular for its inverse to fit in `f32`
    /// is treated as singular.
    pub fn normal_matrix(matrix: &Matrix4<f32>) -> Result<Matrix3<f32>, TransformError> {
        let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        linear
            .try_inverse()
            .filter(|inverse| inverse.iter().all(|v| v.is_finite()))
            .map(|inverse| inverse.transpose())
            .ok_or(TransformError::Singular)
    }

    /// Produce a transformed copy of `mesh`.
    ///
    /// Positions go through the full matrix, normals through the
    /// inverse-transpose and are re-normalised. A mirroring matrix reverses
    /// triangle winding so faces keep pointing outward.
    pub fn apply_transform(mesh: &Mesh, matrix: &Matrix4<f32>) -> Result<Mesh, TransformError> {
        let normal_matrix = Self::normal_matrix(matrix)?;
        let mirrored = matrix.fixed_view::<3, 3>(0, 0).into_owned().determinant() < 0.0;

        let positions = mesh
            .positions
            .iter()
            .map(|p| matrix.transform_point(p))
            .collect();

        let indices = if mirrored {
            mesh.indices.iter().map(|&[a, b, c]| [a, c, b]).collect()
        } else {
            mesh.indices.clone()
        };

        let normals = mesh.normals.as_ref().map(|normals| {
            normals
                .iter()
                .map(|n| {
                    let t = normal_matrix * n;
                    t.try_normalize(f32::EPSILON).unwrap_or(t)
                })
                .collect()
        });

        Ok(Mesh {
            positions,
            indices,
            normals,
        })
    }

    /// Fold one incremental request into an existing transform
    pub fn apply_incremental(
        existing: &LocalTransform,
        kind: TransformKind,
        delta: Vector3<f32>,
    ) -> Result<LocalTransform, TransformError> {
        check_finite("delta", &delta)?;

        let mut next = *existing;
        match kind {
            TransformKind::Translate => next.position += delta,
            TransformKind::Rotate => next.rotation.rotate(delta.x, delta.y, delta.z),
            TransformKind::Scale => {
                for axis in Axis::ALL {
                    if delta[axis.index()] == 0.0 {
                        return Err(TransformError::ZeroScale { axis });
                    }
                }
                next.scale.component_mul_assign(&delta);
            }
        }

        // Large but finite inputs can still overflow
        next.validate()?;
        Ok(next)
    }
}
