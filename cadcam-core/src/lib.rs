//! CADCam Core - shape modeling engine
//!
//! Owns the shapes of a scene: parametric tessellation, incremental
//! transforms, selection, change notifications and STL export. Viewports
//! and other front ends sit on top of [`SceneManager`] and the buffers it
//! publishes.

pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod extrude;
pub mod geometry;
pub mod kernel;
pub mod scene;
pub mod shape;
pub mod stl;
pub mod transform;

// Re-export commonly used types
pub use config::{ExportConfig, KernelConfig, SceneConfig, StlEncoding};
pub use error::{CoreError, CoreResult, ExportError, TransformError};
pub use events::SceneEvent;
pub use export::{ExportFormat, ExportReport, MeshBuffers};
pub use geometry::{Aabb, Mesh, Shading, Triangle};
pub use scene::SceneManager;
pub use shape::{ExtrusionProfile, Shape, ShapeId, ShapeKind, ShapeParams};
pub use transform::{Axis, LocalTransform, RotationState, Transform, TransformKind};
