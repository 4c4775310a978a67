//! Engine events
//!
//! Broadcast after state changes commit, for SSE streaming and any in-process
//! listeners. Emission is best-effort: a missing subscriber never fails the
//! operation that produced the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// PTRK engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A project template was replaced by a new version
    TemplateUpdated {
        project_id: Uuid,
        component_type: String,
        version: i64,
        actor: String,
        applied_to_existing: bool,
        affected_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// System templates were copied into a project
    TemplatesCloned {
        project_id: Uuid,
        component_types: Vec<String>,
        forced: bool,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// A recalculation pass committed
    RecalculationCompleted {
        project_id: Uuid,
        component_type: String,
        template_version: i64,
        affected_count: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A recalculation pass rolled back
    RecalculationFailed {
        project_id: Uuid,
        component_type: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A component's cached percentage changed after a milestone update
    ComponentProgressChanged {
        component_id: Uuid,
        project_id: Uuid,
        component_type: String,
        previous_percent: u8,
        percent_complete: u8,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event type name, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::TemplateUpdated { .. } => "TemplateUpdated",
            EngineEvent::TemplatesCloned { .. } => "TemplatesCloned",
            EngineEvent::RecalculationCompleted { .. } => "RecalculationCompleted",
            EngineEvent::RecalculationFailed { .. } => "RecalculationFailed",
            EngineEvent::ComponentProgressChanged { .. } => "ComponentProgressChanged",
        }
    }

    pub fn project_id(&self) -> Uuid {
        match self {
            EngineEvent::TemplateUpdated { project_id, .. }
            | EngineEvent::TemplatesCloned { project_id, .. }
            | EngineEvent::RecalculationCompleted { project_id, .. }
            | EngineEvent::RecalculationFailed { project_id, .. }
            | EngineEvent::ComponentProgressChanged { project_id, .. } => *project_id,
        }
    }
}

/// Broadcast channel for engine events
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
