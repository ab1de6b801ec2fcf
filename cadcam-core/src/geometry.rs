//! Geometry primitives: indexed triangle meshes, triangles and bounds

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// How per-vertex normals are produced for a tessellated shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shading {
    /// Each triangle gets its own vertices carrying the face normal
    #[default]
    Flat,
    /// Shared vertices carry the area-weighted average of adjacent face normals
    Smooth,
}

/// A triangle resolved to its three corner positions
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub vertices: [Point3<f32>; 3],
}

impl Triangle {
    pub fn new(v0: Point3<f32>, v1: Point3<f32>, v2: Point3<f32>) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Unnormalised face normal. Its length is twice the triangle area.
    pub fn scaled_normal(&self) -> Vector3<f32> {
        let [v0, v1, v2] = self.vertices;
        (v1 - v0).cross(&(v2 - v0))
    }

    /// Calculate the face normal from the triangle's vertices, `None` when degenerate
    pub fn calculate_normal(&self) -> Option<Vector3<f32>> {
        self.scaled_normal().try_normalize(f32::MIN_POSITIVE)
    }

    pub fn area(&self) -> f32 {
        0.5 * self.scaled_normal().norm()
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn extents(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// An indexed triangle mesh.
///
/// Triangles index into `positions` with counter-clockwise winding seen from
/// outside. When `normals` is present it holds one unit normal per position.
/// [`Mesh::validate`] checks both invariants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Point3<f32>>,
    pub indices: Vec<[u32; 3]>,
    pub normals: Option<Vec<Vector3<f32>>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            indices: Vec::new(),
            normals: None,
        }
    }

    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(triangles),
            normals: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// True when there is nothing to draw or export
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Append a vertex and return its index
    pub fn push_vertex(&mut self, position: Point3<f32>) -> u32 {
        self.positions.push(position);
        (self.positions.len() - 1) as u32
    }

    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.push([a, b, c]);
    }

    /// Resolve triangle `index` to its corner positions
    pub fn triangle(&self, index: usize) -> Triangle {
        let [a, b, c] = self.indices[index];
        Triangle::new(
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        )
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.indices.len()).map(|i| self.triangle(i))
    }

    pub fn bounds(&self) -> Option<Aabb> {
        let first = *self.positions.first()?;
        let aabb = self.positions.iter().fold(
            Aabb {
                min: first,
                max: first,
            },
            |acc, p| Aabb {
                min: acc.min.inf(p),
                max: acc.max.sup(p),
            },
        );
        Some(aabb)
    }

    pub fn surface_area(&self) -> f32 {
        self.triangles().map(|t| t.area()).sum()
    }

    /// Enclosed volume by the divergence theorem. Only meaningful for closed,
    /// consistently wound meshes.
    pub fn volume(&self) -> f32 {
        self.triangles()
            .map(|t| {
                let [a, b, c] = t.vertices;
                a.coords.dot(&b.coords.cross(&c.coords))
            })
            .sum::<f32>()
            / 6.0
    }

    /// Check the index and normal invariants
    pub fn validate(&self) -> CoreResult<()> {
        let count = self.positions.len();
        if let Some((i, tri)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, tri)| tri.iter().any(|&v| v as usize >= count))
        {
            return Err(CoreError::invariant(format!(
                "triangle {i} {tri:?} references a vertex beyond {count}"
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != count {
                return Err(CoreError::invariant(format!(
                    "{} normals for {count} vertices",
                    normals.len()
                )));
            }
            if normals.iter().any(|n| n.iter().any(|c| !c.is_finite())) {
                return Err(CoreError::invariant("non-finite vertex normal"));
            }
        }
        if self
            .positions
            .iter()
            .any(|p| p.iter().any(|c| !c.is_finite()))
        {
            return Err(CoreError::invariant("non-finite vertex position"));
        }
        Ok(())
    }

    pub fn with_shading(self, shading: Shading) -> Self {
        match shading {
            Shading::Flat => self.with_flat_normals(),
            Shading::Smooth => self.with_smooth_normals(),
        }
    }

    /// Split every triangle onto its own vertices carrying the face normal
    pub fn with_flat_normals(self) -> Self {
        let mut positions = Vec::with_capacity(self.indices.len() * 3);
        let mut normals = Vec::with_capacity(self.indices.len() * 3);
        let mut indices = Vec::with_capacity(self.indices.len());

        for (i, &[a, b, c]) in self.indices.iter().enumerate() {
            let normal = self
                .triangle(i)
                .calculate_normal()
                .unwrap_or_else(Vector3::zeros);
            let base = positions.len() as u32;
            for v in [a, b, c] {
                positions.push(self.positions[v as usize]);
                normals.push(normal);
            }
            indices.push([base, base + 1, base + 2]);
        }

        Self {
            positions,
            indices,
            normals: Some(normals),
        }
    }

    /// Keep shared vertices and give each the area-weighted average of the
    /// normals of the faces around it
    pub fn with_smooth_normals(mut self) -> Self {
        let mut accumulated = vec![Vector3::zeros(); self.positions.len()];
        for (i, tri) in self.indices.iter().enumerate() {
            // Length of the scaled normal is proportional to area
            let weighted = self.triangle(i).scaled_normal();
            for &v in tri {
                accumulated[v as usize] += weighted;
            }
        }
        let normals = accumulated
            .into_iter()
            .map(|n| n.try_normalize(f32::MIN_POSITIVE).unwrap_or_else(Vector3::y))
            .collect();
        self.normals = Some(normals);
        self
    }
}
