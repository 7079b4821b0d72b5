//! Transport and dispatch seams
//!
//! The registry never talks to the network itself. Cloud, LAN, and camera
//! transports are injected behind these traits, as is the downstream sink
//! that is told when a device channel is ready.

use async_trait::async_trait;
use plugsync_core::{
    Command, ComponentKind, Credentials, DeviceExtra, DeviceId, DeviceReport, Params, Uiid,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Channel is not connected")]
    NotConnected,
    #[error("Device {0} rejected the command: {1}")]
    Rejected(DeviceId, String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport error: {0}")]
    Other(#[from] anyhow::Error),
}

/// One sighting of a device on the LAN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalAnnouncement {
    #[serde(rename = "deviceid")]
    pub id: DeviceId,
    #[serde(default)]
    pub state: Params,
    /// Address the announcement came from; `None` when the device left the network
    #[serde(default)]
    pub host: Option<String>,
}

/// Where a LAN command goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTarget {
    pub id: DeviceId,
    pub host: String,
    pub device_key: Option<String>,
}

/// Remote cloud service
#[async_trait]
pub trait CloudChannel: Send + Sync {
    /// Authenticate. `Ok(false)` means the credentials were rejected.
    async fn login(&self, credentials: &Credentials) -> Result<bool, TransportError>;

    /// Full device list for the account
    async fn list_devices(&self) -> Result<Vec<DeviceReport>, TransportError>;

    /// Begin delivering pushed/polled updates on `events`
    async fn start(&self, events: mpsc::Sender<DeviceReport>) -> Result<(), TransportError>;

    async fn send(&self, id: &DeviceId, command: &Command) -> Result<(), TransportError>;

    /// Release resources; called at most once per start
    async fn stop(&self);
}

/// LAN discovery and direct control
#[async_trait]
pub trait LocalChannel: Send + Sync {
    /// Begin listening; every announcement is delivered on `events`
    async fn start(&self, events: mpsc::Sender<LocalAnnouncement>) -> Result<(), TransportError>;

    async fn send(&self, target: &LocalTarget, command: &Command) -> Result<(), TransportError>;

    async fn stop(&self);
}

/// Camera command path, addressed by short identifiers
#[async_trait]
pub trait CameraChannel: Send + Sync {
    async fn send(&self, id: &DeviceId, command: &Command) -> Result<(), TransportError>;
}

/// Metadata handed to the sink for one device channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchInfo {
    pub device_id: DeviceId,
    /// `None` for single-channel devices
    pub channel: Option<u8>,
    pub name: Option<String>,
    pub available: bool,
    pub force_update: bool,
    pub uiid: Option<Uiid>,
    pub extra: Option<DeviceExtra>,
    /// Outward-facing state, transport-private fields removed
    pub params: Params,
}

/// Downstream registration ("device ready")
///
/// Called from the dispatch worker, never from the registry's own call path.
/// Failures are the sink's concern; nothing is retried.
pub trait DispatchSink: Send + Sync {
    fn notify(&self, kind: &ComponentKind, info: DispatchInfo);
}
