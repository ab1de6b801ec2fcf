//! STL encoding and decoding for binary and ASCII formats
//!
//! Binary layout: 80-byte header, little-endian `u32` facet count, then per
//! facet a normal and three vertices (12 `f32`) followed by a `u16`
//! attribute count.

use nalgebra::{Point3, Vector3};
use nom::{
    bytes::complete::{tag, take},
    character::complete::{multispace0, multispace1, not_line_ending},
    multi::{count, many0},
    number::complete::{float, le_f32, le_u16, le_u32},
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::{CoreError, CoreResult};
use crate::geometry::Mesh;

/// STL binary header size in bytes
pub const HEADER_SIZE: usize = 80;

/// Size of one facet record in binary STL
pub const FACET_SIZE: usize = 50;

const HEADER_TEXT: &[u8] = b"binary STL written by cadcam-core";

/// One STL facet: a unit normal and three counter-clockwise corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Facet {
    pub normal: Vector3<f32>,
    pub vertices: [Point3<f32>; 3],
}

/// Encode facets as binary STL
pub fn encode_binary(facets: &[Facet]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + 4 + facets.len() * FACET_SIZE);

    let mut header = [0u8; HEADER_SIZE];
    header[..HEADER_TEXT.len()].copy_from_slice(HEADER_TEXT);
    out.extend_from_slice(&header);
    out.extend_from_slice(&(facets.len() as u32).to_le_bytes());

    for facet in facets {
        for value in facet.normal.iter() {
            out.extend_from_slice(&value.to_le_bytes());
        }
        for vertex in &facet.vertices {
            for value in vertex.iter() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }

    out
}

/// Encode facets as ASCII STL under the solid name `name`
pub fn encode_ascii(facets: &[Facet], name: &str) -> Vec<u8> {
    let mut out = format!("solid {name}\n");
    for facet in facets {
        let n = facet.normal;
        out.push_str(&format!("  facet normal {:e} {:e} {:e}\n", n.x, n.y, n.z));
        out.push_str("    outer loop\n");
        for v in &facet.vertices {
            out.push_str(&format!("      vertex {:e} {:e} {:e}\n", v.x, v.y, v.z));
        }
        out.push_str("    endloop\n  endfacet\n");
    }
    out.push_str(&format!("endsolid {name}\n"));
    out.into_bytes()
}

fn facets_to_mesh(facets: Vec<Facet>) -> Mesh {
    let mut mesh = Mesh::with_capacity(facets.len() * 3, facets.len());
    let mut normals = Vec::with_capacity(facets.len() * 3);
    for facet in facets {
        let [a, b, c] = facet.vertices.map(|v| mesh.push_vertex(v));
        mesh.push_triangle(a, b, c);
        normals.extend([facet.normal; 3]);
    }
    mesh.normals = Some(normals);
    mesh
}

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> CoreResult<Mesh> {
    if data.len() < HEADER_SIZE + 4 {
        return Err(stl_error("file too small to be a valid STL"));
    }
    let declared = u32::from_le_bytes([
        data[HEADER_SIZE],
        data[HEADER_SIZE + 1],
        data[HEADER_SIZE + 2],
        data[HEADER_SIZE + 3],
    ]) as usize;
    if data.len() - HEADER_SIZE - 4 < declared.saturating_mul(FACET_SIZE) {
        return Err(stl_error(format!(
            "unexpected end of file: header declares {declared} facets"
        )));
    }

    match parse_binary_stl_impl(data) {
        Ok((_, facets)) => Ok(facets_to_mesh(facets)),
        Err(e) => Err(stl_error(format!("malformed binary STL: {e:?}"))),
    }
}

fn parse_binary_stl_impl(input: &[u8]) -> IResult<&[u8], Vec<Facet>> {
    let (input, _) = take(HEADER_SIZE)(input)?;
    let (input, facet_count) = le_u32(input)?;
    count(parse_binary_facet, facet_count as usize)(input)
}

fn parse_binary_facet(input: &[u8]) -> IResult<&[u8], Facet> {
    let (input, normal) = parse_binary_vector(input)?;
    let (input, v0) = parse_binary_vector(input)?;
    let (input, v1) = parse_binary_vector(input)?;
    let (input, v2) = parse_binary_vector(input)?;
    // Attribute byte count
    let (input, _) = le_u16(input)?;

    Ok((
        input,
        Facet {
            normal: Vector3::new(normal.0, normal.1, normal.2),
            vertices: [v0, v1, v2].map(|(x, y, z)| Point3::new(x, y, z)),
        },
    ))
}

fn parse_binary_vector(input: &[u8]) -> IResult<&[u8], (f32, f32, f32)> {
    tuple((le_f32, le_f32, le_f32))(input)
}

/// Parse an ASCII STL file
pub fn parse_ascii_stl(input: &str) -> CoreResult<Mesh> {
    match parse_ascii_stl_impl(input) {
        Ok((_, facets)) => Ok(facets_to_mesh(facets)),
        Err(e) => Err(stl_error(format!("malformed ASCII STL: {e:?}"))),
    }
}

fn parse_ascii_stl_impl(input: &str) -> IResult<&str, Vec<Facet>> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    let (input, _) = not_line_ending(input)?; // Optional name
    let (input, facets) = many0(parse_facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;
    Ok((input, facets))
}

fn parse_facet(input: &str) -> IResult<&str, Facet> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = parse_vector3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, v1) = parse_vertex(input)?;
    let (input, v2) = parse_vertex(input)?;
    let (input, v3) = parse_vertex(input)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((
        input,
        Facet {
            normal: Vector3::new(normal.0, normal.1, normal.2),
            vertices: [v1, v2, v3],
        },
    ))
}

fn parse_vertex(input: &str) -> IResult<&str, Point3<f32>> {
    let (input, _) = preceded(multispace0, tag("vertex"))(input)?;
    let (input, (x, y, z)) = parse_vector3(input)?;
    Ok((input, Point3::new(x, y, z)))
}

fn parse_vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}

/// Detect and parse STL file (binary or ASCII)
pub fn parse_stl(data: &[u8]) -> CoreResult<Mesh> {
    // Try to detect format
    if data.len() > 5 && &data[0..5] == b"solid" {
        // Might be ASCII
        if let Ok(text) = std::str::from_utf8(data) {
            if let Ok(mesh) = parse_ascii_stl(text) {
                return Ok(mesh);
            }
        }
    }

    // Try binary format
    parse_binary_stl(data)
}

fn stl_error(message: impl Into<String>) -> CoreError {
    CoreError::StlParse {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_facets() -> Vec<Facet> {
        vec![
            Facet {
                normal: Vector3::z(),
                vertices: [
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
            },
            Facet {
                normal: Vector3::new(0.0, -1.0, 0.0),
                vertices: [
                    Point3::new(-0.5, 0.0, 0.25),
                    Point3::new(0.5, 0.0, 1e-3),
                    Point3::new(0.0, 0.0, -2.5),
                ],
            },
        ]
    }

    #[test]
    fn test_parse_binary_header() {
        let mut data = vec![0u8; 84];
        // Set triangle count to 0
        data[80..84].copy_from_slice(&0u32.to_le_bytes());

        let result = parse_binary_stl(&data);
        assert!(result.is_ok());
        let mesh = result.unwrap();
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn test_binary_layout() {
        let bytes = encode_binary(&sample_facets());
        assert_eq!(bytes.len(), HEADER_SIZE + 4 + 2 * FACET_SIZE);
        assert_eq!(&bytes[80..84], &2u32.to_le_bytes());
        assert!(!bytes.starts_with(b"solid"));

        let mesh = parse_stl(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.positions[5], Point3::new(0.0, 0.0, -2.5));
        assert_eq!(mesh.normals.unwrap()[3], Vector3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_ascii_with_solid_name() {
        let bytes = encode_ascii(&sample_facets(), "bracket");
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("solid bracket\n"));
        assert!(text.trim_end().ends_with("endsolid bracket"));

        let mesh = parse_stl(&bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.positions[4], Point3::new(0.5, 0.0, 1e-3));
    }

    #[test]
    fn test_truncated_binary_is_rejected() {
        let mut bytes = encode_binary(&sample_facets());
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            parse_binary_stl(&bytes),
            Err(CoreError::StlParse { .. })
        ));
    }
}
