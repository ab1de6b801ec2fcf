//! Geometry kernel: deterministic tessellation of shape parameters into a
//! local-space mesh
//!
//! Every kind is dispatched from [`generate_mesh`]. Primitives are built
//! welded (shared vertices) and then given normals according to the
//! configured [`Shading`](crate::Shading).

use std::f32::consts::{PI, TAU};

use log::trace;
use nalgebra::Point3;

use crate::config::KernelConfig;
use crate::error::{CoreError, CoreResult};
use crate::extrude;
use crate::geometry::Mesh;
use crate::shape::{ShapeKind, ShapeParams};

fn check_dimension(kind: ShapeKind, parameter: &str, value: f32) -> CoreResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::invalid(
            kind,
            parameter,
            format!("must be a positive finite number, got {value}"),
        ))
    }
}

fn resolve_segments(
    kind: ShapeKind,
    segments: Option<u32>,
    config: &KernelConfig,
) -> CoreResult<u32> {
    let segments = segments.unwrap_or(config.default_segments);
    if (3..=config.max_segments).contains(&segments) {
        Ok(segments)
    } else {
        Err(CoreError::invalid(
            kind,
            "segments",
            format!("must lie in 3..={}, got {segments}", config.max_segments),
        ))
    }
}

/// Build the local-space mesh for `params`.
///
/// # Errors
///
/// [`CoreError::InvalidParameters`] when a dimension is not a positive
/// finite number, a segment count is out of range, or an extrusion profile
/// is degenerate. [`CoreError::InvariantViolation`] if tessellation produced
/// an inconsistent mesh.
pub fn generate_mesh(params: &ShapeParams, config: &KernelConfig) -> CoreResult<Mesh> {
    let kind = params.kind();
    let welded = match params {
        ShapeParams::Cube { size } => {
            check_dimension(kind, "size", *size)?;
            cube(*size)
        }
        ShapeParams::Sphere { radius, segments } => {
            check_dimension(kind, "radius", *radius)?;
            let segments = resolve_segments(kind, *segments, config)?;
            uv_sphere(*radius, segments)
        }
        ShapeParams::Cylinder {
            radius,
            height,
            segments,
        } => {
            check_dimension(kind, "radius", *radius)?;
            check_dimension(kind, "height", *height)?;
            let segments = resolve_segments(kind, *segments, config)?;
            cylinder(*radius, *height, segments)
        }
        ShapeParams::Extrusion {
            profile,
            height,
            center,
        } => extrude::extrude(profile, *height, *center, config)?,
    };

    let mesh = welded.with_shading(config.shading);
    mesh.validate()?;
    trace!(
        "tessellated {kind}: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

/// Split a convex quad `a b c d` (counter-clockwise from outside) into two triangles
fn push_quad(mesh: &mut Mesh, a: u32, b: u32, c: u32, d: u32) {
    mesh.push_triangle(a, b, c);
    mesh.push_triangle(a, c, d);
}

/// Cube centred on the origin: 8 vertices, 12 triangles
pub fn cube(size: f32) -> Mesh {
    let half = size / 2.0;
    let mut mesh = Mesh::with_capacity(8, 12);

    // Vertex i has x from bit 0, y from bit 1, z from bit 2
    for i in 0..8u32 {
        let coord = |bit: u32| if i & bit == 0 { -half } else { half };
        mesh.push_vertex(Point3::new(coord(1), coord(2), coord(4)));
    }

    // Left, right
    push_quad(&mut mesh, 0, 4, 6, 2);
    push_quad(&mut mesh, 1, 3, 7, 5);
    // Bottom, top
    push_quad(&mut mesh, 0, 1, 5, 4);
    push_quad(&mut mesh, 2, 6, 7, 3);
    // Back, front
    push_quad(&mut mesh, 0, 2, 3, 1);
    push_quad(&mut mesh, 4, 5, 7, 6);

    mesh
}

/// Point on a ring around the Y axis, counter-clockwise seen from +Y
fn ring_point(radius: f32, y: f32, angle: f32) -> Point3<f32> {
    Point3::new(radius * angle.cos(), y, -radius * angle.sin())
}

/// Cylinder along Y centred on the origin.
///
/// `2 * segments` rim vertices plus two cap centres; `segments` triangles
/// per cap and `2 * segments` around the side.
pub fn cylinder(radius: f32, height: f32, segments: u32) -> Mesh {
    let n = segments;
    let half = height / 2.0;
    let step = TAU / n as f32;
    let mut mesh = Mesh::with_capacity(2 * n as usize + 2, 4 * n as usize);

    for y in [-half, half] {
        for i in 0..n {
            mesh.push_vertex(ring_point(radius, y, step * i as f32));
        }
    }
    let bottom_center = mesh.push_vertex(Point3::new(0.0, -half, 0.0));
    let top_center = mesh.push_vertex(Point3::new(0.0, half, 0.0));

    for i in 0..n {
        let j = (i + 1) % n;
        let (b0, b1, t0, t1) = (i, j, n + i, n + j);
        mesh.push_triangle(bottom_center, b1, b0);
        mesh.push_triangle(top_center, t0, t1);
        push_quad(&mut mesh, b0, b1, t1, t0);
    }

    mesh
}

/// UV sphere centred on the origin with poles on the Y axis.
///
/// `segments` longitudes and `max(segments / 2, 2)` latitude bands.
pub fn uv_sphere(radius: f32, segments: u32) -> Mesh {
    let n = segments;
    let rings = (segments / 2).max(2);
    let step = TAU / n as f32;
    let mut mesh = Mesh::with_capacity(
        2 + ((rings - 1) * n) as usize,
        (2 * n * (rings - 1)) as usize,
    );

    let top = mesh.push_vertex(Point3::new(0.0, radius, 0.0));
    for j in 1..rings {
        let polar = PI * j as f32 / rings as f32;
        let (ring_radius, y) = (radius * polar.sin(), radius * polar.cos());
        for i in 0..n {
            mesh.push_vertex(ring_point(ring_radius, y, step * i as f32));
        }
    }
    let bottom = mesh.push_vertex(Point3::new(0.0, -radius, 0.0));

    // First vertex of latitude ring j (1-based)
    let ring = |j: u32| 1 + (j - 1) * n;

    for i in 0..n {
        let next = (i + 1) % n;
        mesh.push_triangle(top, ring(1) + i, ring(1) + next);
        let last = ring(rings - 1);
        mesh.push_triangle(bottom, last + next, last + i);
    }
    for j in 1..rings - 1 {
        let (upper, lower) = (ring(j), ring(j + 1));
        for i in 0..n {
            let next = (i + 1) % n;
            push_quad(&mut mesh, lower + i, lower + next, upper + next, upper + i);
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Shading;
    use crate::shape::ExtrusionProfile;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn smooth() -> KernelConfig {
        KernelConfig {
            shading: Shading::Smooth,
            ..KernelConfig::default()
        }
    }

    fn assert_outward(mesh: &Mesh) {
        // Convex solids centred on the origin: every face points away from it
        for tri in mesh.triangles() {
            let [a, b, c] = tri.vertices;
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            assert!(tri.scaled_normal().dot(&centroid) > 0.0);
        }
    }

    #[test]
    fn test_cube_counts_and_winding() {
        let mesh = cube(2.0);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert_outward(&mesh);
        assert_relative_eq!(mesh.volume(), 8.0, epsilon = 1e-5);
        assert_relative_eq!(mesh.surface_area(), 24.0, epsilon = 1e-5);
    }

    #[test]
    fn test_flat_cube_duplicates_vertices() {
        let mesh = generate_mesh(&ShapeParams::cube(2.0), &KernelConfig::default()).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.vertex_count(), 36);
        let normals = mesh.normals.as_ref().unwrap();
        assert_eq!(normals.len(), mesh.vertex_count());
        for n in normals {
            // Axis-aligned unit normals
            assert_relative_eq!(n.abs().max(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cylinder_counts_and_measures() {
        let params = ShapeParams::Cylinder {
            radius: 1.0,
            height: 2.0,
            segments: Some(32),
        };
        let mesh = generate_mesh(&params, &smooth()).unwrap();
        assert_eq!(mesh.vertex_count(), 2 * 32 + 2);
        assert_eq!(mesh.triangle_count(), 2 * 32 + 2 * 32);
        assert_outward(&mesh);

        // Inscribed 32-gon: within 1% of the analytic values
        let volume = PI * 1.0 * 2.0;
        let lateral = TAU * 1.0 * 2.0;
        let caps = 2.0 * PI;
        assert_relative_eq!(mesh.volume(), volume, max_relative = 0.01);
        assert_relative_eq!(mesh.surface_area(), lateral + caps, max_relative = 0.01);

        let bounds = mesh.bounds().unwrap();
        assert_relative_eq!(bounds.min.y, -1.0);
        assert_relative_eq!(bounds.max.y, 1.0);
    }

    #[test]
    fn test_sphere_counts_and_measures() {
        let params = ShapeParams::Sphere {
            radius: 2.0,
            segments: Some(48),
        };
        let mesh = generate_mesh(&params, &smooth()).unwrap();
        let rings = 24;
        assert_eq!(mesh.vertex_count(), 2 + (rings - 1) * 48);
        assert_eq!(mesh.triangle_count(), 2 * 48 * (rings - 1));
        assert_outward(&mesh);

        let volume = 4.0 / 3.0 * PI * 8.0;
        assert_relative_eq!(mesh.volume(), volume, max_relative = 0.02);

        // Smooth normals on a sphere point along the radius
        let normals = mesh.normals.as_ref().unwrap();
        for (p, n) in mesh.positions.iter().zip(normals) {
            assert!(n.dot(&(p.coords / 2.0)) > 0.99);
        }
    }

    #[test]
    fn test_default_segments_apply() {
        let mesh = generate_mesh(&ShapeParams::cylinder(1.0, 1.0), &smooth()).unwrap();
        assert_eq!(mesh.triangle_count(), 4 * 32);
    }

    #[test]
    fn test_invalid_parameters() {
        let config = KernelConfig::default();
        let bad = [
            ShapeParams::cube(0.0),
            ShapeParams::cube(-1.0),
            ShapeParams::cube(f32::NAN),
            ShapeParams::sphere(0.0),
            ShapeParams::cylinder(1.0, -2.0),
            ShapeParams::Cylinder {
                radius: 1.0,
                height: 1.0,
                segments: Some(2),
            },
            ShapeParams::Sphere {
                radius: 1.0,
                segments: Some(100_000),
            },
            ShapeParams::extrusion(
                ExtrusionProfile::Custom {
                    points: vec![[0.0, 0.0], [1.0, 0.0]],
                },
                1.0,
            ),
        ];
        for params in &bad {
            match generate_mesh(params, &config) {
                Err(CoreError::InvalidParameters { kind, .. }) => assert_eq!(kind, params.kind()),
                other => panic!("{params:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let params = ShapeParams::sphere(1.5);
        let config = KernelConfig::default();
        let a = generate_mesh(&params, &config).unwrap();
        let b = generate_mesh(&params, &config).unwrap();
        assert_eq!(a, b);
        assert!(a
            .normals
            .as_ref()
            .unwrap()
            .iter()
            .all(|n| (n.norm() - 1.0).abs() < 1e-5 || *n == Vector3::zeros()));
    }
}
