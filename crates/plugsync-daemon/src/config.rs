//! Configuration loading and validation

use anyhow::Result;
use plugsync_core::{ComponentKind, Credentials, DebugSetting, DeviceOverride, Mode, Reload};
use plugsync_registry::{RegistryOptions, StartupOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which transports run: auto, cloud, or local
    #[serde(default)]
    pub mode: Mode,
    /// once: reuse a populated cache in local mode; always: refresh from cloud
    #[serde(default)]
    pub reload: Reload,
    /// Kind used for relays when nothing more specific is known
    #[serde(default = "default_class")]
    pub default_class: String,
    /// true, or a list of device ids to trace
    #[serde(default)]
    pub debug: DebugSetting,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    /// Per-device overrides keyed by device id
    #[serde(default)]
    pub devices: HashMap<String, DeviceOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            reload: Reload::default(),
            default_class: default_class(),
            debug: DebugSetting::default(),
            daemon: DaemonConfig::default(),
            cloud: CloudConfig::default(),
            local: LocalConfig::default(),
            camera: CameraConfig::default(),
            devices: HashMap::new(),
        }
    }
}

fn default_class() -> String {
    ComponentKind::SWITCH.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the REST API
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Device cache snapshot
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cache_path: default_cache_path(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cache_path() -> String {
    "./.plugsync.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Base URL of the cloud API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Poll cadence for cloud state in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            api_url: default_api_url(),
            scan_interval_secs: default_scan_interval(),
        }
    }
}

fn default_api_url() -> String {
    "https://eu-api.coolkit.cc:8080".to_string()
}

fn default_scan_interval() -> u64 {
    300 // 5 minutes
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Address the LAN announcement listener binds to
    #[serde(default = "default_local_bind")]
    pub bind: SocketAddr,
    /// HTTP port devices accept LAN commands on
    #[serde(default = "default_command_port")]
    pub command_port: u16,
    /// LAN command timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            bind: default_local_bind(),
            command_port: default_command_port(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_local_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8082))
}

fn default_command_port() -> u16 {
    8081
}

fn default_command_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// UDP port cameras listen on for broadcast commands
    #[serde(default = "default_camera_port")]
    pub port: u16,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            port: default_camera_port(),
        }
    }
}

fn default_camera_port() -> u16 {
    32108
}

impl Config {
    /// Cloud credentials, only when both parts are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.cloud.username, &self.cloud.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.cloud.scan_interval_secs.max(1))
    }

    /// Convert to RegistryOptions
    pub fn to_registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            default_class: ComponentKind::new(self.default_class.clone()),
            debug: self.debug.clone(),
        }
    }

    /// Convert to StartupOptions
    pub fn to_startup_options(&self) -> StartupOptions {
        StartupOptions {
            mode: self.mode,
            reload: self.reload,
            credentials: self.credentials(),
            overrides: self.devices.clone(),
        }
    }

    /// Copy that is safe to show over the API
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.cloud.password.is_some() {
            config.cloud.password = Some("***".to_string());
        }
        for device in config.devices.values_mut() {
            if device.device_key.is_some() {
                device.device_key = Some("***".to_string());
            }
        }
        config
    }
}

/// Load configuration from file, falling back to defaults when it is absent
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

/// Save an example configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let mut config = Config::default();
    config.cloud.username = Some("user@example.com".to_string());
    config.cloud.password = Some("change-me".to_string());
    config.devices.insert(
        "1000abcdef".to_string(),
        DeviceOverride {
            name: Some("Kitchen Lamp".to_string()),
            device_class: Some("light".into()),
            device_key: None,
            force_update: Some(false),
        },
    );

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
