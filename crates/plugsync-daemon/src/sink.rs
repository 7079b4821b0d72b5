//! Entity sink
//!
//! Records every dispatched device channel as an entity and fans the
//! registration out to WebSocket subscribers.

use chrono::{DateTime, Utc};
use plugsync_core::ComponentKind;
use plugsync_registry::{DispatchInfo, DispatchSink};
use serde::Serialize;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::info;

/// One surfaced device channel
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub kind: ComponentKind,
    #[serde(flatten)]
    pub info: DispatchInfo,
    pub registered_at: DateTime<Utc>,
}

/// Dispatch sink that keeps the entity list for the API
pub struct BroadcastSink {
    entities: RwLock<Vec<Entity>>,
    events: broadcast::Sender<Entity>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            entities: RwLock::new(Vec::new()),
            events,
        }
    }

    /// All entities registered so far, in registration order
    pub fn entities(&self) -> Vec<Entity> {
        self.entities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Subscribe to new registrations
    pub fn subscribe(&self) -> broadcast::Receiver<Entity> {
        self.events.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchSink for BroadcastSink {
    fn notify(&self, kind: &ComponentKind, info: DispatchInfo) {
        info!(
            device = %info.device_id,
            kind = %kind,
            channel = ?info.channel,
            available = info.available,
            "Device ready"
        );

        let entity = Entity {
            kind: kind.clone(),
            info,
            registered_at: Utc::now(),
        };
        self.entities
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entity.clone());

        // No subscribers is fine
        let _ = self.events.send(entity);
    }
}
