//! plugsync Registry - Discovery reconciliation for cloud and LAN devices
//!
//! This crate provides:
//! - The device registry that merges cloud and LAN reports by device id
//! - Exactly-once "device ready" dispatch through a bounded queue
//! - Command routing by identifier shape
//! - The startup sequence (cache, cloud login, LAN discovery, cloud updates)

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod router;

#[cfg(test)]
mod testing;

pub use channel::{
    CameraChannel, CloudChannel, DispatchInfo, DispatchSink, LocalAnnouncement, LocalChannel,
    LocalTarget, TransportError,
};
pub use error::{RegistryError, Result};
pub use lifecycle::{StartupOptions, StartupPlan, StartupReport};
pub use registry::{DeviceRegistry, RegistryOptions, Transport};
pub use router::{CommandRouter, Route};
