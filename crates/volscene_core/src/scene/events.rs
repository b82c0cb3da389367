//! Scene event bus types.
//!
//! # Responsibility
//! - Name the events a scene emits and the observer contract that receives
//!   them.
//!
//! # Invariants
//! - Observers are called synchronously on the mutating thread and may
//!   mutate the scene re-entrantly. Not thread-safe (single writer).

use crate::model::node::NodeId;
use crate::scene::Scene;
use std::fmt::{Display, Formatter};

/// Handle returned when registering an observer; used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverKey(pub(crate) u64);

impl Display for ObserverKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Event emitted by a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    /// Delivered only to observers subscribed to that node.
    NodeModified(NodeId),
    /// Outermost batch-mutation window opened.
    StartBatch,
    /// Outermost batch-mutation window closed.
    EndBatch,
}

impl SceneEvent {
    /// Stable name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeAdded(_) => "node_added",
            Self::NodeRemoved(_) => "node_removed",
            Self::NodeModified(_) => "node_modified",
            Self::StartBatch => "start_batch",
            Self::EndBatch => "end_batch",
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeAdded(id) | Self::NodeRemoved(id) | Self::NodeModified(id) => Some(id),
            Self::StartBatch | Self::EndBatch => None,
        }
    }
}

/// Receives scene events.
///
/// Implementations keep their own state behind interior mutability since
/// they are shared as `Rc<dyn SceneObserver>` and called with `&self`.
pub trait SceneObserver {
    fn on_scene_event(&self, scene: &mut Scene, event: &SceneEvent);
}
