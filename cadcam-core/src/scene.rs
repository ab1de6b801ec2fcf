//! Scene manager: the single authority over shape lifecycle and selection.
//!
//! All mutations go through one exclusive critical section per scene, so
//! concurrent requests are applied in the order they acquire the lock and
//! readers never see a shape halfway through a change. Readers get cloned
//! snapshots whose meshes are shared behind `Arc`.
//!
//! Notifications are sent on unbounded channels while the lock is held,
//! which fixes their order to the mutation order without ever running
//! observer code inside the lock.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use log::debug;
use nalgebra::Vector3;
use parking_lot::RwLock;

use crate::config::SceneConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::{SceneEvent, Subscribers};
use crate::export::{self, ExportFormat, ExportReport, MeshBuffers};
use crate::geometry::Mesh;
use crate::kernel;
use crate::shape::{Shape, ShapeId, ShapeParams};
use crate::transform::{LocalTransform, Transform, TransformKind};

/// Apply `transform` to a local mesh and check the result
fn resolve_world(
    id: Option<ShapeId>,
    local: &Mesh,
    transform: &LocalTransform,
) -> CoreResult<Mesh> {
    let matrix = Transform::compose(transform);
    let world = Transform::apply_transform(local, &matrix)
        .map_err(|source| CoreError::Transform { id, source })?;
    world.validate()?;
    Ok(world)
}

#[derive(Debug, Clone, Copy)]
struct TransformRecord {
    id: ShapeId,
    before: LocalTransform,
    after: LocalTransform,
}

#[derive(Debug, Default)]
struct History {
    undo: VecDeque<TransformRecord>,
    redo: Vec<TransformRecord>,
}

impl History {
    fn record(&mut self, record: TransformRecord, limit: usize) {
        self.redo.clear();
        if limit == 0 {
            return;
        }
        self.undo.push_back(record);
        while self.undo.len() > limit {
            self.undo.pop_front();
        }
    }

    fn forget(&mut self, id: ShapeId) {
        self.undo.retain(|r| r.id != id);
        self.redo.retain(|r| r.id != id);
    }

    fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[derive(Debug)]
struct SceneState {
    // Ids are issued in increasing order, so key order is creation order
    shapes: BTreeMap<ShapeId, Shape>,
    selected: Option<ShapeId>,
    next_id: u64,
    history: History,
    subscribers: Subscribers,
}

impl SceneState {
    fn new() -> Self {
        Self {
            shapes: BTreeMap::new(),
            selected: None,
            next_id: 1,
            history: History::default(),
            subscribers: Subscribers::default(),
        }
    }

    fn shape(&self, id: ShapeId, operation: &'static str) -> CoreResult<&Shape> {
        self.shapes
            .get(&id)
            .ok_or_else(|| CoreError::not_found(id, operation))
    }

    /// Publish an event if anyone is listening; the event is only built then
    fn notify(&mut self, event: impl FnOnce() -> SceneEvent) {
        if !self.subscribers.is_empty() {
            self.subscribers.publish(event());
        }
    }

    /// Replace a shape's transform and world mesh together
    fn retransform(
        &mut self,
        id: ShapeId,
        transform: LocalTransform,
        operation: &'static str,
    ) -> CoreResult<()> {
        let shape = self
            .shapes
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(id, operation))?;
        let world = Arc::new(resolve_world(Some(id), &shape.local_mesh, &transform)?);
        shape.transform = transform;
        shape.world_mesh = Arc::clone(&world);

        self.notify(|| SceneEvent::ShapeTransformed {
            id,
            buffers: export::to_viewport_buffers(&world),
        });
        Ok(())
    }
}

/// Registry of shapes, their transforms and the current selection.
///
/// Each manager is an independent scene; share one between threads with
/// `Arc<SceneManager>`.
#[derive(Debug)]
pub struct SceneManager {
    config: SceneConfig,
    state: RwLock<SceneState>,
}

impl Default for SceneManager {
    fn default() -> Self {
        Self {
            config: SceneConfig::default(),
            state: RwLock::new(SceneState::new()),
        }
    }
}

impl SceneManager {
    /// Create an empty scene.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] when `config` fails [`SceneConfig::validate`].
    pub fn new(config: SceneConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: RwLock::new(SceneState::new()),
        })
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Open a notification channel. Events published before this call are
    /// not replayed.
    ///
    /// The channel is unbounded and most events carry full mesh buffers, so
    /// a receiver must be drained or dropped. An idle receiver that is kept
    /// alive buffers every event from then on.
    pub fn subscribe(&self) -> Receiver<SceneEvent> {
        self.state.write().subscribers.subscribe()
    }

    /// Create a shape and return its new identifier.
    ///
    /// Tessellation and the initial transform are resolved before the scene
    /// is touched; on failure nothing is registered.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidParameters`] for bad shape parameters and
    /// [`CoreError::Transform`] for a non-finite or zero-scale initial
    /// transform.
    pub fn create_shape(
        &self,
        params: ShapeParams,
        initial: Option<LocalTransform>,
    ) -> CoreResult<ShapeId> {
        let mut transform = initial.unwrap_or_default();
        transform.rotation = transform.rotation.wrapped();
        transform
            .validate()
            .map_err(|source| CoreError::Transform { id: None, source })?;
        let local = Arc::new(kernel::generate_mesh(&params, &self.config.kernel)?);
        let world = Arc::new(resolve_world(None, &local, &transform)?);

        let mut state = self.state.write();
        let id = ShapeId::from_raw(state.next_id);
        state.next_id += 1;

        debug!(
            "created {id} ({}) with {} triangles",
            params.kind(),
            world.triangle_count()
        );
        state.shapes.insert(
            id,
            Shape {
                id,
                params,
                transform,
                local_mesh: local,
                world_mesh: Arc::clone(&world),
            },
        );
        state.notify(|| SceneEvent::ShapeCreated {
            id,
            buffers: export::to_viewport_buffers(&world),
        });
        Ok(id)
    }

    /// Snapshot of one shape.
    pub fn get_shape(&self, id: ShapeId) -> CoreResult<Shape> {
        self.state.read().shape(id, "get_shape").cloned()
    }

    /// Snapshots of every shape in creation order.
    pub fn shapes(&self) -> Vec<Shape> {
        self.state.read().shapes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().shapes.is_empty()
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.state.read().shapes.contains_key(&id)
    }

    /// Current world-space mesh of a shape.
    pub fn world_mesh(&self, id: ShapeId) -> CoreResult<Arc<Mesh>> {
        let state = self.state.read();
        let shape = state.shape(id, "world_mesh")?;
        Ok(Arc::clone(&shape.world_mesh))
    }

    /// Current world-space mesh of a shape as viewport buffers.
    pub fn mesh_buffers(&self, id: ShapeId) -> CoreResult<MeshBuffers> {
        let mesh = {
            let state = self.state.read();
            Arc::clone(&state.shape(id, "mesh_buffers")?.world_mesh)
        };
        Ok(export::to_viewport_buffers(&mesh))
    }

    /// Apply an incremental translate, rotate or scale to a shape.
    ///
    /// The world mesh is recomputed before returning, and the change is
    /// recorded for [`undo`](Self::undo).
    ///
    /// # Errors
    ///
    /// [`CoreError::ShapeNotFound`] for an unknown id and
    /// [`CoreError::Transform`] for a zero scale factor or non-finite delta.
    pub fn apply_transform(
        &self,
        id: ShapeId,
        kind: TransformKind,
        delta: Vector3<f32>,
    ) -> CoreResult<()> {
        let mut state = self.state.write();
        let before = state.shape(id, "apply_transform")?.transform;
        let after = Transform::apply_incremental(&before, kind, delta)
            .map_err(|source| CoreError::Transform {
                id: Some(id),
                source,
            })?;

        state.retransform(id, after, "apply_transform")?;
        state
            .history
            .record(TransformRecord { id, before, after }, self.config.history_limit);
        debug!("{kind} {id} by ({}, {}, {})", delta.x, delta.y, delta.z);
        Ok(())
    }

    /// Replace a shape's parameters and re-tessellate it.
    ///
    /// The kind cannot change; the transform is kept.
    pub fn update_parameters(&self, id: ShapeId, params: ShapeParams) -> CoreResult<()> {
        let mut state = self.state.write();
        let shape = state.shape(id, "update_parameters")?;
        if shape.kind() != params.kind() {
            return Err(CoreError::invalid(
                params.kind(),
                "kind",
                format!("cannot change a {} into a {}", shape.kind(), params.kind()),
            ));
        }
        let transform = shape.transform;

        let local = Arc::new(kernel::generate_mesh(&params, &self.config.kernel)?);
        let world = Arc::new(resolve_world(Some(id), &local, &transform)?);

        if let Some(shape) = state.shapes.get_mut(&id) {
            shape.params = params;
            shape.local_mesh = local;
            shape.world_mesh = Arc::clone(&world);
        }
        state.notify(|| SceneEvent::ShapeRegenerated {
            id,
            buffers: export::to_viewport_buffers(&world),
        });
        debug!("regenerated {id}");
        Ok(())
    }

    /// Set or clear the selection.
    ///
    /// Returns whether the selection changed; re-selecting the selected
    /// shape or clearing an empty selection returns `false` and emits
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShapeNotFound`] when `id` does not resolve.
    pub fn select_shape(&self, id: Option<ShapeId>) -> CoreResult<bool> {
        let mut state = self.state.write();
        if let Some(id) = id {
            state.shape(id, "select_shape")?;
        }
        if state.selected == id {
            return Ok(false);
        }

        state.selected = id;
        state.notify(|| SceneEvent::SelectionChanged { id });
        debug!("selection is now {id:?}");
        Ok(true)
    }

    pub fn selected_id(&self) -> Option<ShapeId> {
        self.state.read().selected
    }

    /// Snapshot of the selected shape, if any.
    pub fn selected_shape(&self) -> Option<Shape> {
        let state = self.state.read();
        state.selected.and_then(|id| state.shapes.get(&id).cloned())
    }

    /// Remove a shape. A selected shape is deselected first.
    ///
    /// Undo records for the shape are discarded; its id is never reissued.
    pub fn delete_shape(&self, id: ShapeId) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.shapes.remove(&id).is_none() {
            return Err(CoreError::not_found(id, "delete_shape"));
        }
        if state.selected == Some(id) {
            state.selected = None;
            state.notify(|| SceneEvent::SelectionChanged { id: None });
        }
        state.history.forget(id);
        state.notify(|| SceneEvent::ShapeDeleted { id });
        debug!("deleted {id}");
        Ok(())
    }

    /// Write a shape's current world mesh to `destination`.
    ///
    /// The mesh is resolved under the lock; encoding and writing happen
    /// after it is released.
    ///
    /// # Errors
    ///
    /// [`CoreError::ShapeNotFound`] for an unknown id and
    /// [`CoreError::Export`] when the adapter rejects the mesh or the write
    /// fails.
    pub fn export_shape(
        &self,
        id: ShapeId,
        destination: impl AsRef<Path>,
        format: ExportFormat,
    ) -> CoreResult<ExportReport> {
        let mesh = {
            let state = self.state.read();
            Arc::clone(&state.shape(id, "export_shape")?.world_mesh)
        };
        export::export_mesh(&mesh, destination.as_ref(), format, &self.config.export)
            .map_err(|source| CoreError::Export {
                id: Some(id),
                source,
            })
    }

    /// Revert the most recent transform. Returns `false` with nothing to undo.
    pub fn undo(&self) -> CoreResult<bool> {
        let mut state = self.state.write();
        let Some(record) = state.history.undo.pop_back() else {
            return Ok(false);
        };
        if let Err(e) = state.retransform(record.id, record.before, "undo") {
            state.history.undo.push_back(record);
            return Err(e);
        }
        state.history.redo.push(record);
        debug!("undid transform of {}", record.id);
        Ok(true)
    }

    /// Re-apply the most recently undone transform. Returns `false` with
    /// nothing to redo.
    pub fn redo(&self) -> CoreResult<bool> {
        let mut state = self.state.write();
        let Some(record) = state.history.redo.pop() else {
            return Ok(false);
        };
        if let Err(e) = state.retransform(record.id, record.after, "redo") {
            state.history.redo.push(record);
            return Err(e);
        }
        state.history.undo.push_back(record);
        debug!("redid transform of {}", record.id);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.state.read().history.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.read().history.redo.is_empty()
    }

    pub fn clear_history(&self) {
        self.state.write().history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use approx::assert_relative_eq;

    fn scene() -> SceneManager {
        SceneManager::default()
    }

    #[test]
    fn test_ids_are_never_reused() {
        let scene = scene();
        let a = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        scene.delete_shape(a).unwrap();
        let b = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_failed_creation_registers_nothing() {
        let scene = scene();
        assert!(scene.create_shape(ShapeParams::cube(-1.0), None).is_err());

        let bad = LocalTransform {
            scale: Vector3::new(1.0, 0.0, 1.0),
            ..LocalTransform::identity()
        };
        assert!(matches!(
            scene.create_shape(ShapeParams::cube(1.0), Some(bad)),
            Err(CoreError::Transform { id: None, .. })
        ));
        assert!(scene.is_empty());

        // The failed attempts did not consume ids
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        assert_eq!(id, ShapeId::from_raw(1));
    }

    #[test]
    fn test_initial_transform() {
        let scene = scene();
        let id = scene
            .create_shape(
                ShapeParams::cube(2.0),
                Some(LocalTransform::from_position(1.0, 2.0, 3.0)),
            )
            .unwrap();
        let bounds = scene.world_mesh(id).unwrap().bounds().unwrap();
        assert_relative_eq!(bounds.center(), nalgebra::Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_initial_rotation_is_wrapped() {
        let scene = scene();
        let initial = LocalTransform {
            rotation: crate::transform::RotationState::new(10.0, 0.5, -4.0),
            ..LocalTransform::identity()
        };
        let id = scene
            .create_shape(ShapeParams::cube(1.0), Some(initial))
            .unwrap();
        let rotation = scene.get_shape(id).unwrap().transform().rotation;
        assert_relative_eq!(rotation.x, 10.0 - 2.0 * std::f32::consts::TAU, epsilon = 1e-5);
        assert_eq!(rotation.y, 0.5);
        assert_relative_eq!(rotation.z, -4.0 + std::f32::consts::TAU, epsilon = 1e-5);
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = SceneConfig::default();
        config.kernel.default_segments = 2;
        assert!(matches!(
            SceneManager::new(config),
            Err(CoreError::Config { .. })
        ));

        let mut config = SceneConfig::default();
        config.export.degenerate_tolerance = f32::NAN;
        assert!(SceneManager::new(config).is_err());
    }

    #[test]
    fn test_near_singular_scale_is_rejected() {
        let scene = scene();
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        let events = scene.subscribe();
        let squash = Vector3::new(1e-20, 1.0, 1.0);

        scene.apply_transform(id, TransformKind::Scale, squash).unwrap();
        let before = scene.get_shape(id).unwrap();

        // A second squash leaves an inverse that overflows f32
        let err = scene
            .apply_transform(id, TransformKind::Scale, squash)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transform {
                source: TransformError::Singular,
                ..
            }
        ));

        let after = scene.get_shape(id).unwrap();
        assert_eq!(after.transform(), before.transform());
        assert_eq!(after.world_mesh(), before.world_mesh());
        let normals = scene.mesh_buffers(id).unwrap().normals.unwrap();
        assert!(normals.iter().all(|c| c.is_finite()));
        // Only the accepted squash was announced
        assert_eq!(events.try_iter().count(), 1);
    }

    #[test]
    fn test_transform_errors_carry_shape_id() {
        let scene = scene();
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        let err = scene
            .apply_transform(id, TransformKind::Scale, Vector3::new(0.0, 1.0, 1.0))
            .unwrap_err();
        match err {
            CoreError::Transform {
                id: Some(failed),
                source: TransformError::ZeroScale { .. },
            } => assert_eq!(failed, id),
            other => panic!("unexpected {other:?}"),
        }
        // Rejected transforms leave the shape and history alone
        assert_eq!(scene.get_shape(id).unwrap().transform(), &LocalTransform::identity());
        assert!(!scene.can_undo());
    }

    #[test]
    fn test_update_parameters_keeps_transform() {
        let scene = scene();
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        scene
            .apply_transform(id, TransformKind::Translate, Vector3::new(5.0, 0.0, 0.0))
            .unwrap();
        scene.update_parameters(id, ShapeParams::cube(4.0)).unwrap();

        let shape = scene.get_shape(id).unwrap();
        assert_eq!(shape.params(), &ShapeParams::cube(4.0));
        let bounds = shape.world_mesh().bounds().unwrap();
        assert_relative_eq!(bounds.extents(), Vector3::new(4.0, 4.0, 4.0));
        assert_relative_eq!(bounds.center().x, 5.0);

        assert!(matches!(
            scene.update_parameters(id, ShapeParams::sphere(1.0)),
            Err(CoreError::InvalidParameters { .. })
        ));
        assert!(matches!(
            scene.update_parameters(id, ShapeParams::cube(0.0)),
            Err(CoreError::InvalidParameters { .. })
        ));
        assert_eq!(scene.get_shape(id).unwrap().params(), &ShapeParams::cube(4.0));
    }

    #[test]
    fn test_history_is_bounded() {
        let config = SceneConfig {
            history_limit: 2,
            ..SceneConfig::default()
        };
        let scene = SceneManager::new(config).unwrap();
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        for _ in 0..3 {
            scene
                .apply_transform(id, TransformKind::Translate, Vector3::new(1.0, 0.0, 0.0))
                .unwrap();
        }
        assert!(scene.undo().unwrap());
        assert!(scene.undo().unwrap());
        assert!(!scene.undo().unwrap());
        assert_relative_eq!(scene.get_shape(id).unwrap().transform().position.x, 1.0);
    }

    #[test]
    fn test_new_transform_clears_redo() {
        let scene = scene();
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        let step = Vector3::new(0.0, 1.0, 0.0);
        scene.apply_transform(id, TransformKind::Translate, step).unwrap();
        scene.undo().unwrap();
        assert!(scene.can_redo());
        scene.apply_transform(id, TransformKind::Translate, step).unwrap();
        assert!(!scene.can_redo());
    }

    #[test]
    fn test_no_events_without_subscribers() {
        let scene = scene();
        let id = scene.create_shape(ShapeParams::cube(1.0), None).unwrap();
        let rx = scene.subscribe();
        scene.select_shape(Some(id)).unwrap();
        // Only the selection change after subscribing arrives
        assert_eq!(rx.try_iter().count(), 1);
    }
}
