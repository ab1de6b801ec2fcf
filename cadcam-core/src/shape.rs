//! Shape identity, parameter sets and the per-shape record owned by the scene

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::geometry::Mesh;
use crate::transform::LocalTransform;

/// Opaque shape identifier, rendered as `shape-<n>`.
///
/// Issued by a [`SceneManager`](crate::SceneManager) from a monotonically
/// increasing counter and never reused by that manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ShapeId(u64);

impl ShapeId {
    const PREFIX: &'static str = "shape-";

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for ShapeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(Self::PREFIX)
            .and_then(|n| n.parse().ok())
            .map(Self)
            .ok_or_else(|| format!("malformed shape id `{s}`"))
    }
}

impl From<ShapeId> for String {
    fn from(id: ShapeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ShapeId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Discriminator selecting the parameter schema and tessellation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Cube,
    Sphere,
    Cylinder,
    Extrusion,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Cube => "cube",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Extrusion => "extrusion",
        };
        f.write_str(name)
    }
}

/// 2D profile swept by an extrusion, one variant per extrusion style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum ExtrusionProfile {
    /// Arbitrary simple polygon in the XY plane. A closing point equal to
    /// the first point is accepted and dropped.
    Custom { points: Vec<[f32; 2]> },
    /// Rectangle with `width` along X and `length` along Y.
    Rectangle { width: f32, length: f32 },
    /// Regular polygon inscribed in a circle of `radius`.
    Polygon { sides: u32, radius: f32 },
}

impl ExtrusionProfile {
    /// Outline points of the profile, before normalisation.
    pub fn outline(&self) -> Vec<Point2<f32>> {
        match self {
            ExtrusionProfile::Custom { points } => {
                points.iter().map(|&[x, y]| Point2::new(x, y)).collect()
            }
            ExtrusionProfile::Rectangle { width, length } => {
                let (hw, hl) = (width / 2.0, length / 2.0);
                vec![
                    Point2::new(-hw, -hl),
                    Point2::new(hw, -hl),
                    Point2::new(hw, hl),
                    Point2::new(-hw, hl),
                ]
            }
            ExtrusionProfile::Polygon { sides, radius } => {
                let step = std::f32::consts::TAU / *sides as f32;
                (0..*sides)
                    .map(|i| {
                        let angle = step * i as f32;
                        Point2::new(radius * angle.cos(), radius * angle.sin())
                    })
                    .collect()
            }
        }
    }
}

fn default_center() -> bool {
    true
}

/// Kind-specific shape parameters.
///
/// Serialised with a `kind` tag so creation requests can arrive as JSON:
/// `{"kind": "cylinder", "radius": 1.0, "height": 2.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeParams {
    /// Axis-aligned cube centred on the origin.
    Cube { size: f32 },
    /// UV sphere centred on the origin, poles on the Y axis.
    Sphere {
        radius: f32,
        #[serde(default)]
        segments: Option<u32>,
    },
    /// Cylinder centred on the origin with its axis along Y.
    Cylinder {
        radius: f32,
        height: f32,
        #[serde(default)]
        segments: Option<u32>,
    },
    /// Profile in the XY plane swept along +Z.
    Extrusion {
        profile: ExtrusionProfile,
        height: f32,
        #[serde(default = "default_center")]
        center: bool,
    },
}

impl ShapeParams {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeParams::Cube { .. } => ShapeKind::Cube,
            ShapeParams::Sphere { .. } => ShapeKind::Sphere,
            ShapeParams::Cylinder { .. } => ShapeKind::Cylinder,
            ShapeParams::Extrusion { .. } => ShapeKind::Extrusion,
        }
    }

    pub fn cube(size: f32) -> Self {
        ShapeParams::Cube { size }
    }

    pub fn sphere(radius: f32) -> Self {
        ShapeParams::Sphere {
            radius,
            segments: None,
        }
    }

    pub fn cylinder(radius: f32, height: f32) -> Self {
        ShapeParams::Cylinder {
            radius,
            height,
            segments: None,
        }
    }

    pub fn extrusion(profile: ExtrusionProfile, height: f32) -> Self {
        ShapeParams::Extrusion {
            profile,
            height,
            center: true,
        }
    }
}

/// A shape instance as seen by callers.
///
/// Only the scene manager constructs or mutates shapes; callers receive
/// snapshots. The world mesh is recomputed whenever parameters or transform
/// change, so it always matches the values stored alongside it.
#[derive(Debug, Clone)]
pub struct Shape {
    pub(crate) id: ShapeId,
    pub(crate) params: ShapeParams,
    pub(crate) transform: LocalTransform,
    pub(crate) local_mesh: Arc<Mesh>,
    pub(crate) world_mesh: Arc<Mesh>,
}

impl Shape {
    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn kind(&self) -> ShapeKind {
        self.params.kind()
    }

    pub fn params(&self) -> &ShapeParams {
        &self.params
    }

    pub fn transform(&self) -> &LocalTransform {
        &self.transform
    }

    /// Untransformed mesh produced by the geometry kernel.
    pub fn local_mesh(&self) -> &Arc<Mesh> {
        &self.local_mesh
    }

    /// Mesh after the shape's transform has been applied.
    pub fn world_mesh(&self) -> &Arc<Mesh> {
        &self.world_mesh
    }
}
