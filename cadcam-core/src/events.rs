//! Scene notifications and their subscriber fan-out

use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;

use crate::export::MeshBuffers;
use crate::shape::ShapeId;

/// Notification emitted after a scene mutation has been applied.
///
/// Events reach every subscriber in the order the mutations happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SceneEvent {
    ShapeCreated { id: ShapeId, buffers: MeshBuffers },
    ShapeTransformed { id: ShapeId, buffers: MeshBuffers },
    /// Parameters changed and the shape was re-tessellated
    ShapeRegenerated { id: ShapeId, buffers: MeshBuffers },
    SelectionChanged { id: Option<ShapeId> },
    ShapeDeleted { id: ShapeId },
}

impl SceneEvent {
    pub fn shape_id(&self) -> Option<ShapeId> {
        match self {
            SceneEvent::ShapeCreated { id, .. }
            | SceneEvent::ShapeTransformed { id, .. }
            | SceneEvent::ShapeRegenerated { id, .. }
            | SceneEvent::ShapeDeleted { id } => Some(*id),
            SceneEvent::SelectionChanged { id } => *id,
        }
    }

    /// Mesh carried by the event, if any
    pub fn buffers(&self) -> Option<&MeshBuffers> {
        match self {
            SceneEvent::ShapeCreated { buffers, .. }
            | SceneEvent::ShapeTransformed { buffers, .. }
            | SceneEvent::ShapeRegenerated { buffers, .. } => Some(buffers),
            _ => None,
        }
    }
}

/// Unbounded per-subscriber channels. Sending never blocks, so publishing
/// from inside the scene lock cannot stall on a slow observer; a live
/// receiver that is never drained keeps every event it is sent.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<Sender<SceneEvent>>,
}

impl Subscribers {
    pub fn subscribe(&mut self) -> Receiver<SceneEvent> {
        let (tx, rx) = channel::unbounded();
        self.senders.push(tx);
        rx
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Deliver `event` to every live subscriber, dropping disconnected ones
    pub fn publish(&mut self, event: SceneEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_pruning() {
        let mut subscribers = Subscribers::default();
        let first = subscribers.subscribe();
        let second = subscribers.subscribe();

        let event = SceneEvent::ShapeDeleted {
            id: ShapeId::from_raw(1),
        };
        subscribers.publish(event.clone());
        assert_eq!(first.try_recv().unwrap(), event);
        assert_eq!(second.try_recv().unwrap(), event);

        drop(second);
        subscribers.publish(SceneEvent::SelectionChanged { id: None });
        assert_eq!(subscribers.senders.len(), 1);
        assert_eq!(
            first.try_recv().unwrap(),
            SceneEvent::SelectionChanged { id: None }
        );
    }

    #[test]
    fn test_idle_receiver_buffers_until_dropped() {
        let mut subscribers = Subscribers::default();
        let idle = subscribers.subscribe();
        for raw in 1..=5 {
            subscribers.publish(SceneEvent::ShapeDeleted {
                id: ShapeId::from_raw(raw),
            });
        }
        assert_eq!(idle.len(), 5);

        drop(idle);
        subscribers.publish(SceneEvent::SelectionChanged { id: None });
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let event = SceneEvent::SelectionChanged {
            id: Some(ShapeId::from_raw(4)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "selection_changed");
        assert_eq!(json["id"], "shape-4");
    }
}
