//! Error types for shape, transform and export operations.
//!
//! Every failure is returned to the immediate caller with the shape and
//! operation it concerns. Nothing in the core logs an error and carries on.

use std::path::PathBuf;

use thiserror::Error;

use crate::shape::{ShapeId, ShapeKind};
use crate::transform::Axis;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced at the scene manager boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Shape parameters are missing, out of range or structurally invalid.
    #[error("invalid {kind} parameter `{parameter}`: {reason}")]
    InvalidParameters {
        /// Kind of shape being built.
        kind: ShapeKind,
        /// Name of the offending parameter.
        parameter: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The identifier was never issued or the shape has been deleted.
    #[error("shape {id} not found ({operation})")]
    ShapeNotFound {
        /// Identifier the caller supplied.
        id: ShapeId,
        /// Manager operation that failed.
        operation: &'static str,
    },

    /// A transform input was rejected.
    #[error("{}transform rejected: {source}", shape_prefix(.id))]
    Transform {
        /// Shape being transformed, if any.
        id: Option<ShapeId>,
        /// Underlying transform failure.
        #[source]
        source: TransformError,
    },

    /// Export failed.
    #[error("{}export failed: {source}", shape_prefix(.id))]
    Export {
        /// Shape being exported, if any.
        id: Option<ShapeId>,
        /// Underlying export failure.
        #[source]
        source: ExportError,
    },

    /// Internal consistency check failed. This is a defect in the core.
    #[error("mesh invariant violated: {context}")]
    InvariantViolation {
        /// Which invariant broke.
        context: String,
    },

    /// Configuration could not be read.
    #[error("invalid configuration: {message}")]
    Config {
        /// Parser message.
        message: String,
    },

    /// STL input could not be decoded.
    #[error("failed to parse STL: {message}")]
    StlParse {
        /// Parser message.
        message: String,
    },
}

fn shape_prefix(id: &Option<ShapeId>) -> String {
    id.map(|id| format!("{id}: ")).unwrap_or_default()
}

impl CoreError {
    /// Create an `InvalidParameters` error.
    pub fn invalid(
        kind: ShapeKind,
        parameter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameters {
            kind,
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create a `ShapeNotFound` error.
    pub fn not_found(id: ShapeId, operation: &'static str) -> Self {
        Self::ShapeNotFound { id, operation }
    }

    /// Create an `InvariantViolation` error.
    pub fn invariant(context: impl Into<String>) -> Self {
        Self::InvariantViolation {
            context: context.into(),
        }
    }

    /// True for caller errors the caller may fix and retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvariantViolation { .. })
    }
}

/// Transform inputs that would produce an unusable matrix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// NaN or infinite component.
    #[error("{field} is not finite ({value})")]
    NonFinite {
        /// Which input carried the value.
        field: &'static str,
        /// The rejected value.
        value: f32,
    },

    /// A scale factor of exactly zero collapses the shape.
    #[error("zero scale along {axis} axis")]
    ZeroScale {
        /// Axis with zero scale.
        axis: Axis,
    },

    /// The linear part of the matrix cannot be inverted.
    #[error("matrix is singular")]
    Singular,

    /// Transform kind name not recognised.
    #[error("unknown transform kind `{name}`")]
    UnknownKind {
        /// The rejected name.
        name: String,
    },
}

/// Failures of the mesh export adapter.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The mesh has no triangles.
    #[error("mesh has no triangles to export")]
    EmptyMesh,

    /// Too many zero-area triangles to produce a trustworthy file.
    #[error("{skipped} of {total} facets are degenerate (tolerance {tolerance})")]
    TooManyDegenerate {
        /// Facets skipped.
        skipped: usize,
        /// Facets in the mesh.
        total: usize,
        /// Allowed fraction.
        tolerance: f32,
    },

    /// Requested format is not supported.
    #[error("unsupported export format `{format}`")]
    UnsupportedFormat {
        /// Rejected format name.
        format: String,
    },

    /// Writing the destination failed.
    #[error("I/O error writing {}: {source}", .path.display())]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
