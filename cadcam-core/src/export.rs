//! Mesh export adapter.
//!
//! Turns a resolved world-space [`Mesh`] into the formats consumed outside
//! the core: flat viewport buffers and STL files.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::{ExportConfig, StlEncoding};
use crate::error::ExportError;
use crate::geometry::Mesh;
use crate::stl::{self, Facet};

/// Solid name written into ASCII STL files.
const SOLID_NAME: &str = "cadcam";

/// Flat buffers handed to a viewport.
///
/// `vertices` and `normals` hold `3 * vertex_count` floats, `faces` holds
/// `3 * triangle_count` indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffers {
    pub vertices: Vec<f32>,
    pub faces: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub normals: Option<Vec<f32>>,
}

impl MeshBuffers {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.len() / 3
    }
}

/// Flatten a mesh into viewport buffers.
pub fn to_viewport_buffers(mesh: &Mesh) -> MeshBuffers {
    MeshBuffers {
        vertices: mesh.positions.iter().flat_map(|p| [p.x, p.y, p.z]).collect(),
        faces: mesh.indices.iter().flatten().copied().collect(),
        normals: mesh
            .normals
            .as_ref()
            .map(|normals| normals.iter().flat_map(|n| [n.x, n.y, n.z]).collect()),
    }
}

/// Persistent export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Stl,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Stl => "stl",
        }
    }

    /// Detect the format from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        extension.parse()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("stl") {
            Ok(ExportFormat::Stl)
        } else {
            Err(ExportError::UnsupportedFormat {
                format: s.to_string(),
            })
        }
    }
}

/// Encoded STL with facet accounting.
#[derive(Debug, Clone)]
pub struct StlOutput {
    pub bytes: Vec<u8>,
    pub facets_written: usize,
    /// Zero-area triangles left out of the file.
    pub degenerate_skipped: usize,
}

/// Encode a mesh as STL.
///
/// Facet normals are recomputed from the corners. Triangles with area at or
/// below `config.degenerate_area_epsilon` are skipped and counted.
///
/// # Errors
///
/// [`ExportError::EmptyMesh`] for a mesh without triangles, and
/// [`ExportError::TooManyDegenerate`] when the skipped fraction exceeds
/// `config.degenerate_tolerance` or nothing would be written.
pub fn to_stl(mesh: &Mesh, config: &ExportConfig) -> Result<StlOutput, ExportError> {
    let total = mesh.triangle_count();
    if total == 0 {
        return Err(ExportError::EmptyMesh);
    }

    let facets: Vec<Facet> = mesh
        .triangles()
        .filter(|t| t.area() > config.degenerate_area_epsilon)
        .filter_map(|t| {
            t.calculate_normal().map(|normal| Facet {
                normal,
                vertices: t.vertices,
            })
        })
        .collect();

    let skipped = total - facets.len();
    if facets.is_empty() || skipped as f32 / total as f32 > config.degenerate_tolerance {
        return Err(ExportError::TooManyDegenerate {
            skipped,
            total,
            tolerance: config.degenerate_tolerance,
        });
    }

    let bytes = match config.stl_encoding {
        StlEncoding::Binary => stl::encode_binary(&facets),
        StlEncoding::Ascii => stl::encode_ascii(&facets, SOLID_NAME),
    };

    Ok(StlOutput {
        bytes,
        facets_written: facets.len(),
        degenerate_skipped: skipped,
    })
}

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub facets_written: usize,
    pub degenerate_skipped: usize,
    pub bytes_written: usize,
}

/// Encode `mesh` and write it to `path`.
///
/// Encoding finishes before the destination is opened, so a rejected mesh
/// never leaves a file behind.
pub fn export_mesh(
    mesh: &Mesh,
    path: &Path,
    format: ExportFormat,
    config: &ExportConfig,
) -> Result<ExportReport, ExportError> {
    let output = match format {
        ExportFormat::Stl => to_stl(mesh, config)?,
    };

    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&output.bytes).map_err(io_error)?;
    writer.flush().map_err(io_error)?;

    if output.degenerate_skipped > 0 {
        info!(
            "skipped {} degenerate facets exporting {}",
            output.degenerate_skipped,
            path.display()
        );
    }
    debug!(
        "exported {} facets ({} bytes) to {}",
        output.facets_written,
        output.bytes.len(),
        path.display()
    );

    Ok(ExportReport {
        path: path.to_path_buf(),
        format,
        facets_written: output.facets_written,
        degenerate_skipped: output.degenerate_skipped,
        bytes_written: output.bytes.len(),
    })
}
