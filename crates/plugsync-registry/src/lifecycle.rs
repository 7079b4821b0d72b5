//! Startup sequencing
//!
//! Order: cache → cloud login → overrides → local discovery → cloud devices
//! and cloud updates. Previously known devices are available before any
//! transport starts.

use plugsync_core::{CacheStore, Credentials, DeviceOverride, Mode, Reload};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::DeviceRegistry;

/// Inputs to the startup sequence
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub mode: Mode,
    pub reload: Reload,
    pub credentials: Option<Credentials>,
    pub overrides: HashMap<String, DeviceOverride>,
}

/// What the startup sequence will do, decided before any transport is touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupPlan {
    pub cloud_login: bool,
    pub cloud_devices: bool,
    pub local: bool,
}

impl StartupPlan {
    /// Decide the plan.
    ///
    /// In local mode with `reload = once` and a populated cache the cloud is
    /// never contacted. Cloud mode without credentials cannot work at all.
    pub fn resolve(
        mode: Mode,
        reload: Reload,
        has_credentials: bool,
        cache_populated: bool,
    ) -> Result<Self> {
        let local_once = mode == Mode::Local && reload == Reload::Once && cache_populated;

        if mode == Mode::Cloud && !has_credentials {
            return Err(RegistryError::ConfigurationInvalid(
                "cloud mode requires username and password".to_string(),
            ));
        }

        Ok(Self {
            cloud_login: has_credentials && !local_once,
            cloud_devices: mode.uses_cloud(),
            local: mode.uses_local(),
        })
    }
}

/// Outcome of a completed startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Devices seeded from the cache
    pub cached: usize,
    pub cloud_connected: bool,
    pub local_started: bool,
    /// Running without a cloud connection it would otherwise have
    pub degraded: bool,
}

/// Run the startup sequence. Only an unsatisfiable configuration is an error.
pub async fn start(
    registry: &Arc<DeviceRegistry>,
    cache: &dyn CacheStore,
    options: &StartupOptions,
) -> Result<StartupReport> {
    info!(mode = %options.mode, "Starting device registry");

    let cached = registry.seed_from(cache).await;

    let plan = match StartupPlan::resolve(
        options.mode,
        options.reload,
        options.credentials.is_some(),
        cached > 0,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "Can't start");
            return Err(e);
        }
    };
    debug!(plan = ?plan, "Startup plan");

    let mut report = StartupReport {
        cached,
        ..Default::default()
    };

    match (&options.credentials, plan.cloud_login) {
        (Some(credentials), true) => {
            report.cloud_connected = registry.start_cloud(credentials).await;
            if report.cloud_connected {
                if let Err(e) = registry.save_to(cache).await {
                    warn!(error = %e, "Failed to update device cache");
                }
            }
        }
        (Some(_), false) => info!("Using cached devices, cloud login skipped"),
        (None, _) => {}
    }
    report.degraded = plan.cloud_login && !report.cloud_connected;

    registry.attach_existing(&options.overrides).await;

    if plan.local {
        match registry.start_local().await {
            Ok(()) => report.local_started = true,
            Err(e) => warn!(error = %e, "Failed to start local discovery"),
        }
    }

    if plan.cloud_devices {
        registry.register_known_devices().await;
        if report.cloud_connected {
            if let Err(e) = registry.start_cloud_events().await {
                warn!(error = %e, "Failed to start cloud updates");
            }
        }
    }

    info!(
        cached = report.cached,
        cloud = report.cloud_connected,
        local = report.local_started,
        devices = registry.len().await,
        "Device registry started"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryOptions;
    use crate::testing::{FakeCloud, FakeLocal, RecordingSink};
    use plugsync_core::{DeviceDescriptor, DeviceMap, DeviceReport, JsonFileCache};
    use serde_json::json;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn credentials() -> Option<Credentials> {
        Some(Credentials {
            username: "user@example.com".into(),
            password: "secret".into(),
        })
    }

    fn populated_cache(dir: &TempDir) -> JsonFileCache {
        let cache = JsonFileCache::new(dir.path().join(".plugsync.json"));
        let mut device = DeviceDescriptor::new("1000000001".into());
        device.online = true;
        device.params.insert("switch".into(), json!("on"));
        let mut devices = DeviceMap::new();
        devices.insert("1000000001".into(), device);
        cache.save(&devices).unwrap();
        cache
    }

    #[test]
    fn test_plan_local_once_skips_login() {
        let plan = StartupPlan::resolve(Mode::Local, Reload::Once, true, true).unwrap();
        assert!(!plan.cloud_login);
        assert!(plan.local);
        assert!(!plan.cloud_devices);

        let plan = StartupPlan::resolve(Mode::Local, Reload::Once, true, false).unwrap();
        assert!(plan.cloud_login);

        let plan = StartupPlan::resolve(Mode::Local, Reload::Always, true, true).unwrap();
        assert!(plan.cloud_login);
    }

    #[test]
    fn test_plan_cloud_requires_credentials() {
        let err = StartupPlan::resolve(Mode::Cloud, Reload::Once, false, true).unwrap_err();
        assert!(err.is_fatal());

        let plan = StartupPlan::resolve(Mode::Auto, Reload::Once, false, false).unwrap();
        assert!(!plan.cloud_login);
        assert!(plan.local && plan.cloud_devices);
    }

    #[tokio::test]
    async fn test_local_once_never_logs_in() {
        let dir = TempDir::new().unwrap();
        let cache = populated_cache(&dir);
        let cloud = FakeCloud::accepting(Vec::new());
        let local = FakeLocal::new();
        let (sink, _rx) = RecordingSink::new();
        let registry =
            DeviceRegistry::new(cloud.clone(), local.clone(), sink, RegistryOptions::default());

        let options = StartupOptions {
            mode: Mode::Local,
            reload: Reload::Once,
            credentials: credentials(),
            ..Default::default()
        };
        let report = start(&registry, &cache, &options).await.unwrap();

        assert_eq!(cloud.logins(), 0);
        assert_eq!(report.cached, 1);
        assert!(report.local_started);
        assert!(!report.degraded);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_auth_failure_keeps_local() {
        let dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(dir.path().join("absent.json"));
        let cloud = FakeCloud::rejecting();
        let local = FakeLocal::new();
        let (sink, _rx) = RecordingSink::new();
        let registry =
            DeviceRegistry::new(cloud.clone(), local.clone(), sink, RegistryOptions::default());

        let options = StartupOptions {
            mode: Mode::Auto,
            credentials: credentials(),
            ..Default::default()
        };
        let report = start(&registry, &cache, &options).await.unwrap();

        assert_eq!(cloud.logins(), 1);
        assert!(!report.cloud_connected);
        assert!(report.degraded);
        assert!(report.local_started);
        assert!(local.started());
        assert!(logs_contain("Can't connect to cloud"));
        assert!(logs_contain("cloud authentication failed"));
    }

    #[tokio::test]
    async fn test_cloud_mode_without_credentials_fails() {
        let dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(dir.path().join("absent.json"));
        let local = FakeLocal::new();
        let (sink, _rx) = RecordingSink::new();
        let registry = DeviceRegistry::new(
            FakeCloud::rejecting(),
            local.clone(),
            sink,
            RegistryOptions::default(),
        );

        let options = StartupOptions {
            mode: Mode::Cloud,
            ..Default::default()
        };
        let err = start(&registry, &cache, &options).await.unwrap_err();
        assert!(matches!(err, RegistryError::ConfigurationInvalid(_)));
        assert!(!local.started());
    }

    #[tokio::test]
    async fn test_auto_mode_registers_cloud_devices_and_saves_cache() {
        let dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(dir.path().join(".plugsync.json"));
        let mut report = DeviceReport::new("1000000001");
        report.online = Some(true);
        report.params.insert("switches".into(), json!([]));
        let cloud = FakeCloud::accepting(vec![report]);
        let (sink, mut rx) = RecordingSink::new();
        let registry = DeviceRegistry::new(
            cloud.clone(),
            FakeLocal::new(),
            sink,
            RegistryOptions::default(),
        );

        let options = StartupOptions {
            mode: Mode::Auto,
            credentials: credentials(),
            ..Default::default()
        };
        let report = start(&registry, &cache, &options).await.unwrap();
        assert!(report.cloud_connected);

        let dispatched = RecordingSink::collect(&mut rx, 4).await;
        assert!(dispatched.iter().all(|(kind, _)| kind.as_str() == "switch"));
        assert_eq!(dispatched[0].1.params["cloud"], json!("online"));

        assert!(cache.load().unwrap().contains_key("1000000001"));
        assert!(cloud.events.lock().unwrap().is_some());
    }
}
