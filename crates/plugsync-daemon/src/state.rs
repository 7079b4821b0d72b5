//! Application state management

use anyhow::{bail, Result};
use plugsync_core::JsonFileCache;
use plugsync_registry::{
    lifecycle, CameraChannel, CloudChannel, CommandRouter, DeviceRegistry, LocalChannel,
    StartupReport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::camera::UdpCameraChannel;
use crate::cloud::HttpCloudChannel;
use crate::config::Config;
use crate::lan::UdpLocalChannel;
use crate::sink::BroadcastSink;

/// Shared application state
pub struct AppState {
    /// Device registry
    pub registry: Arc<DeviceRegistry>,
    /// Operator command entry point
    pub router: CommandRouter,
    /// Entities dispatched so far, plus the event feed for WebSocket clients
    pub sink: Arc<BroadcastSink>,
    /// Device snapshot on disk
    pub cache: JsonFileCache,
    /// Configuration
    pub config: Config,
    /// Outcome of the startup sequence
    pub startup: StartupReport,
}

impl AppState {
    /// Create application state with the network transports from `config`
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let cloud = Arc::new(HttpCloudChannel::new(
            config.cloud.api_url.clone(),
            config.scan_interval(),
        )?);
        let local = Arc::new(UdpLocalChannel::new(
            config.local.bind,
            config.local.command_port,
            Duration::from_secs(config.local.command_timeout_secs),
        )?);
        let camera = Arc::new(UdpCameraChannel::new(config.camera.port));

        Self::with_channels(config, cloud, local, camera).await
    }

    /// Create application state and run the startup sequence over the given
    /// transports
    pub async fn with_channels(
        config: Config,
        cloud: Arc<dyn CloudChannel>,
        local: Arc<dyn LocalChannel>,
        camera: Arc<dyn CameraChannel>,
    ) -> Result<Arc<Self>> {
        let sink = Arc::new(BroadcastSink::new());
        let registry =
            DeviceRegistry::new(cloud, local, sink.clone(), config.to_registry_options());
        let cache = JsonFileCache::new(&config.daemon.cache_path);

        let options = config.to_startup_options();
        let startup = match lifecycle::start(&registry, &cache, &options).await {
            Ok(report) => report,
            Err(e) if e.is_fatal() => bail!("Can't start device registry: {}", e),
            Err(e) => {
                warn!(error = %e, "Device registry started with errors");
                StartupReport::default()
            }
        };
        if startup.degraded {
            warn!("Cloud unavailable, running on cached and LAN devices only");
        }

        let router = CommandRouter::new(registry.clone(), camera);

        Ok(Arc::new(Self {
            registry,
            router,
            sink,
            cache,
            config,
            startup,
        }))
    }

    /// Stop all transports and persist the device snapshot
    pub async fn shutdown(&self) {
        self.registry.stop().await;
        match self.registry.save_to(&self.cache).await {
            Ok(()) => info!(path = %self.cache.path().display(), "Device cache saved"),
            Err(e) => warn!(error = %e, "Failed to save device cache"),
        }
    }
}
