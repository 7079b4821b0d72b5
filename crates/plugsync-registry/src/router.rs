//! Outbound command routing by identifier shape

use plugsync_core::{Command, DeviceId, IdKind};
use std::sync::Arc;
use tracing::debug;

use crate::channel::CameraChannel;
use crate::error::{RegistryError, Result};
use crate::registry::DeviceRegistry;

/// Destination chosen for a raw identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Standard device, sent through the registry's transports
    Device,
    /// Camera, sent through the camera channel
    Camera,
}

/// Resolve the route for a raw identifier
pub fn route(raw_id: &str) -> Result<Route> {
    match DeviceId::from(raw_id).kind() {
        IdKind::Standard => Ok(Route::Device),
        IdKind::Camera => Ok(Route::Camera),
        IdKind::Invalid => Err(RegistryError::InvalidIdentifier(raw_id.to_string())),
    }
}

/// Operator-facing entry point for raw commands
pub struct CommandRouter {
    registry: Arc<DeviceRegistry>,
    camera: Arc<dyn CameraChannel>,
}

impl CommandRouter {
    pub fn new(registry: Arc<DeviceRegistry>, camera: Arc<dyn CameraChannel>) -> Self {
        Self { registry, camera }
    }

    /// Send `command` to `raw_id`. A malformed id fails before any transport
    /// is touched.
    pub async fn send(&self, raw_id: &str, command: &Command) -> Result<Route> {
        let route = route(raw_id)?;
        let id = DeviceId::from(raw_id);
        debug!(device = %id, route = ?route, "Routing command");

        match route {
            Route::Device => self.registry.send(&id, command).await?,
            Route::Camera => self.camera.send(&id, command).await?,
        }
        Ok(route)
    }
}
