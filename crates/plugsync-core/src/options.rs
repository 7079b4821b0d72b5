//! Configuration vocabulary shared by the registry and the daemon

use serde::{Deserialize, Serialize};

use crate::device::DeclaredClass;

/// Which transports the registry runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Cloud and LAN together
    #[default]
    Auto,
    /// Cloud only, credentials required
    Cloud,
    /// LAN only
    Local,
}

impl Mode {
    pub fn uses_cloud(self) -> bool {
        matches!(self, Self::Auto | Self::Cloud)
    }

    pub fn uses_local(self) -> bool {
        matches!(self, Self::Auto | Self::Local)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cloud => write!(f, "cloud"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Whether a cached device list is enough to skip the cloud in local mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reload {
    /// Reuse the cache and skip the cloud when it is populated
    #[default]
    Once,
    /// Always refresh the device list from the cloud
    Always,
}

/// Cloud account credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// `debug = true` or `debug = ["1000abcdef", ...]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DebugSetting {
    Enabled(bool),
    Devices(Vec<String>),
}

impl Default for DebugSetting {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl DebugSetting {
    /// Verbose logging requested in any form
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Devices(_) => true,
        }
    }

    /// Whether per-device diagnostics should be emitted for `id`
    pub fn traces(&self, id: &str) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Devices(ids) => ids.iter().any(|d| d == id),
        }
    }
}

/// Per-device user configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_class: Option<DeclaredClass>,
    #[serde(default, rename = "devicekey")]
    pub device_key: Option<String>,
    #[serde(default)]
    pub force_update: Option<bool>,
}
