//! Device cache persisted as a single JSON snapshot
//!
//! The snapshot maps device id to the last known descriptor and is re-read
//! verbatim on the next start, so previously known devices are available
//! before any transport has reported them. Runtime-only fields (`host`,
//! `dispatched`, `extra`) are never written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::device::{DeviceDescriptor, DeviceId};

/// Device id to descriptor, as held by the registry
pub type DeviceMap = HashMap<String, DeviceDescriptor>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Load/save seam for the device snapshot
pub trait CacheStore: Send + Sync {
    fn load(&self) -> Result<DeviceMap, CacheError>;
    fn save(&self, devices: &DeviceMap) -> Result<(), CacheError>;
}

/// Snapshot stored in one JSON file
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonFileCache {
    fn load(&self) -> Result<DeviceMap, CacheError> {
        let content = std::fs::read_to_string(&self.path)?;
        let raw: HashMap<String, DeviceDescriptor> = serde_json::from_str(&content)?;

        // The key is authoritative if a stored descriptor disagrees with it
        let devices: DeviceMap = raw
            .into_iter()
            .map(|(id, mut device)| {
                device.id = DeviceId::new(id.clone());
                (id, device)
            })
            .collect();

        debug!(path = %self.path.display(), count = devices.len(), "Loaded device cache");
        Ok(devices)
    }

    fn save(&self, devices: &DeviceMap) -> Result<(), CacheError> {
        let content = serde_json::to_string_pretty(devices)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), count = devices.len(), "Saved device cache");
        Ok(())
    }
}
