//! Profile extrusion: normalisation, validation, cap triangulation and sweep

use nalgebra::{Point2, Point3, Vector2};

use crate::config::KernelConfig;
use crate::error::{CoreError, CoreResult};
use crate::geometry::Mesh;
use crate::shape::{ExtrusionProfile, ShapeKind};

const KIND: ShapeKind = ShapeKind::Extrusion;

/// Twice the signed area; positive for counter-clockwise loops
fn cross(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Signed area of a closed loop, positive when counter-clockwise
pub fn signed_area(points: &[Point2<f32>]) -> f32 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum::<f32>()
        / 2.0
}

/// Area centroid of a simple polygon with non-zero `area`
fn centroid(points: &[Point2<f32>], area: f32) -> Point2<f32> {
    let n = points.len();
    let sum = (0..n).fold(Vector2::zeros(), |acc, i| {
        let (p, q) = (points[i], points[(i + 1) % n]);
        let w = p.x * q.y - q.x * p.y;
        acc + (p.coords + q.coords) * w
    });
    Point2::from(sum / (6.0 * area))
}

/// `q` lies within the bounding box of `p`-`r` (collinearity checked by caller)
fn on_segment(p: Point2<f32>, q: Point2<f32>, r: Point2<f32>) -> bool {
    q.x >= p.x.min(r.x) && q.x <= p.x.max(r.x) && q.y >= p.y.min(r.y) && q.y <= p.y.max(r.y)
}

fn segments_intersect(p1: Point2<f32>, p2: Point2<f32>, p3: Point2<f32>, p4: Point2<f32>) -> bool {
    let d1 = cross(p3, p4, p1);
    let d2 = cross(p3, p4, p2);
    let d3 = cross(p1, p2, p3);
    let d4 = cross(p1, p2, p4);

    let straddles = |a: f32, b: f32| (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    // Touching or collinear overlap
    (d1 == 0.0 && on_segment(p3, p1, p4))
        || (d2 == 0.0 && on_segment(p3, p2, p4))
        || (d3 == 0.0 && on_segment(p1, p3, p2))
        || (d4 == 0.0 && on_segment(p1, p4, p2))
}

/// First pair of non-adjacent edges that cross or touch, if any
fn find_self_intersection(points: &[Point2<f32>]) -> Option<(usize, usize)> {
    let n = points.len();
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments_intersect(points[i], points[(i + 1) % n], points[j], points[(j + 1) % n]) {
                return Some((i, j));
            }
        }
    }
    None
}

fn check_dimension(parameter: &str, value: f32) -> CoreResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::invalid(
            KIND,
            parameter,
            format!("must be a positive finite number, got {value}"),
        ))
    }
}

/// Resolve a profile to a validated counter-clockwise loop.
///
/// A closing point equal to the first one and consecutive duplicates are
/// dropped. Fails on fewer than three distinct points, more points than
/// `config.max_segments`, non-finite coordinates, (near) zero enclosed area
/// or crossing edges.
pub fn normalize_profile(
    profile: &ExtrusionProfile,
    config: &KernelConfig,
) -> CoreResult<Vec<Point2<f32>>> {
    match profile {
        ExtrusionProfile::Custom { points } => {
            if points.len() > config.max_segments as usize {
                return Err(CoreError::invalid(
                    KIND,
                    "profile",
                    format!(
                        "{} points exceeds the limit of {}",
                        points.len(),
                        config.max_segments
                    ),
                ));
            }
        }
        ExtrusionProfile::Rectangle { width, length } => {
            check_dimension("width", *width)?;
            check_dimension("length", *length)?;
        }
        ExtrusionProfile::Polygon { sides, radius } => {
            if *sides < 3 || *sides > config.max_segments {
                return Err(CoreError::invalid(
                    KIND,
                    "sides",
                    format!("must lie in 3..={}, got {sides}", config.max_segments),
                ));
            }
            check_dimension("radius", *radius)?;
        }
    }

    let mut points = profile.outline();
    if let Some(p) = points.iter().find(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(CoreError::invalid(
            KIND,
            "profile",
            format!("non-finite point ({}, {})", p.x, p.y),
        ));
    }

    points.dedup();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return Err(CoreError::invalid(
            KIND,
            "profile",
            format!("needs at least 3 distinct points, got {}", points.len()),
        ));
    }

    let area = signed_area(&points);
    if area.abs() <= config.area_epsilon {
        return Err(CoreError::invalid(
            KIND,
            "profile",
            "encloses zero area",
        ));
    }
    if let Some((i, j)) = find_self_intersection(&points) {
        return Err(CoreError::invalid(
            KIND,
            "profile",
            format!("edges {i} and {j} intersect"),
        ));
    }

    if area < 0.0 {
        points.reverse();
    }
    Ok(points)
}

fn is_ear(points: &[Point2<f32>], remaining: &[usize], prev: usize, cur: usize, next: usize) -> bool {
    let (a, b, c) = (points[prev], points[cur], points[next]);
    if cross(a, b, c) <= 0.0 {
        return false;
    }
    remaining
        .iter()
        .filter(|&&v| v != prev && v != cur && v != next)
        .all(|&v| {
            let p = points[v];
            !(cross(a, b, p) >= 0.0 && cross(b, c, p) >= 0.0 && cross(c, a, p) >= 0.0)
        })
}

/// Ear-clipping triangulation of a simple counter-clockwise polygon.
///
/// Handles concave outlines. Returns `n - 2` triangles indexing `points`,
/// all counter-clockwise.
pub fn triangulate(points: &[Point2<f32>]) -> CoreResult<Vec<[u32; 3]>> {
    let n = points.len();
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n.saturating_sub(2));
    let mut i = 0;
    let mut misses = 0;

    while remaining.len() > 3 {
        let m = remaining.len();
        let idx = i % m;
        let prev = remaining[(idx + m - 1) % m];
        let cur = remaining[idx];
        let next = remaining[(idx + 1) % m];

        if is_ear(points, &remaining, prev, cur, next) {
            triangles.push([prev as u32, cur as u32, next as u32]);
            remaining.remove(idx);
            // Step back: the previous corner may have become an ear
            i = (idx + remaining.len() - 1) % remaining.len();
            misses = 0;
        } else {
            i = idx + 1;
            misses += 1;
            if misses > m {
                return Err(CoreError::invalid(
                    KIND,
                    "profile",
                    "could not be triangulated (nearly collinear or overlapping points)",
                ));
            }
        }
    }

    if let [a, b, c] = remaining[..] {
        if cross(points[a], points[b], points[c]) > 0.0 {
            triangles.push([a as u32, b as u32, c as u32]);
        }
    }
    Ok(triangles)
}

/// Sweep a profile along +Z by `height` and cap both ends.
///
/// With `center` the profile's area centroid moves to the origin and the
/// solid spans `-height/2..height/2`; otherwise it spans `0..height` in the
/// profile's own coordinates.
pub fn extrude(
    profile: &ExtrusionProfile,
    height: f32,
    center: bool,
    config: &KernelConfig,
) -> CoreResult<Mesh> {
    check_dimension("height", height)?;
    let points = normalize_profile(profile, config)?;
    let caps = triangulate(&points)?;

    let (offset, z0) = if center {
        let c = centroid(&points, signed_area(&points));
        (c.coords, -height / 2.0)
    } else {
        (Vector2::zeros(), 0.0)
    };

    let n = points.len() as u32;
    let mut mesh = Mesh::with_capacity(points.len() * 2, caps.len() * 2 + points.len() * 2);
    for z in [z0, z0 + height] {
        for p in &points {
            let q = p - offset;
            mesh.push_vertex(Point3::new(q.x, q.y, z));
        }
    }

    for &[a, b, c] in &caps {
        // Bottom faces -Z, top faces +Z
        mesh.push_triangle(a, c, b);
        mesh.push_triangle(n + a, n + b, n + c);
    }

    for i in 0..n {
        let j = (i + 1) % n;
        mesh.push_triangle(i, j, n + j);
        mesh.push_triangle(i, n + j, n + i);
    }

    Ok(mesh)
}
