//! Device registry
//!
//! Owns the canonical id → descriptor map and reconciles what the cloud and
//! the LAN report about each device. Every sighting from either transport goes
//! through [`DeviceRegistry::register_device`], which emits the downstream
//! "device ready" notifications exactly once per device channel.

use plugsync_core::{
    classify, public_state, CacheStore, Command, ComponentKind, Credentials, DebugSetting,
    DeviceDescriptor, DeviceId, DeviceMap, DeviceOverride, DeviceReport, JsonFileCache, Params,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{
    CloudChannel, DispatchInfo, DispatchSink, LocalAnnouncement, LocalChannel, LocalTarget,
};
use crate::dispatch::{Dispatch, DispatchQueue};
use crate::error::{RegistryError, Result};

/// Buffered transport events before the transport has to wait on the registry
pub const EVENT_QUEUE_DEPTH: usize = 100;

/// Registry behaviour taken from configuration
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Kind used for plain relays and state-shape fallbacks
    pub default_class: ComponentKind,
    /// Which devices get per-device diagnostics
    pub debug: DebugSetting,
}

/// Transport selected for an outbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Local,
    Cloud,
}

/// Pick the transport owning a device: the LAN when we have an address for
/// it, otherwise the cloud while it reports the device online.
pub fn select_transport(
    device: &DeviceDescriptor,
    local_active: bool,
    cloud_active: bool,
) -> Option<Transport> {
    if local_active && device.host.is_some() {
        Some(Transport::Local)
    } else if cloud_active && device.online {
        Some(Transport::Cloud)
    } else {
        None
    }
}

/// Canonical device registry shared by both transports
pub struct DeviceRegistry {
    devices: RwLock<DeviceMap>,
    cloud: Arc<dyn CloudChannel>,
    local: Arc<dyn LocalChannel>,
    dispatch: DispatchQueue,
    options: RegistryOptions,
    cloud_active: AtomicBool,
    local_active: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceRegistry {
    /// Create a registry. Must be called inside a Tokio runtime: the dispatch
    /// worker is spawned immediately.
    pub fn new(
        cloud: Arc<dyn CloudChannel>,
        local: Arc<dyn LocalChannel>,
        sink: Arc<dyn DispatchSink>,
        options: RegistryOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            devices: RwLock::new(HashMap::new()),
            cloud,
            local,
            dispatch: DispatchQueue::spawn(sink),
            options,
            cloud_active: AtomicBool::new(false),
            local_active: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Seed from the snapshot at `path`
    pub async fn load_cache(&self, path: &Path) -> usize {
        self.seed_from(&JsonFileCache::new(path)).await
    }

    /// Seed from a cache store. An absent or unreadable snapshot leaves the
    /// registry empty. Entries already known are not overwritten.
    pub async fn seed_from(&self, store: &dyn CacheStore) -> usize {
        let cached = match store.load() {
            Ok(cached) => cached,
            Err(e) => {
                let e = RegistryError::from(e);
                info!(error = %e, "Starting with an empty device list");
                return 0;
            }
        };

        let mut devices = self.devices.write().await;
        let mut seeded = 0;
        for (id, device) in cached {
            if let std::collections::hash_map::Entry::Vacant(entry) = devices.entry(id) {
                entry.insert(device);
                seeded += 1;
            }
        }
        info!(count = seeded, "Loaded devices from cache");
        seeded
    }

    /// Persist the current map through a cache store
    pub async fn save_to(&self, store: &dyn CacheStore) -> Result<()> {
        let snapshot = self.snapshot().await;
        store.save(&snapshot)?;
        Ok(())
    }

    /// Create-or-update entries from cloud reports
    pub async fn merge_cloud(&self, reports: Vec<DeviceReport>) {
        let mut devices = self.devices.write().await;
        for report in reports {
            devices
                .entry(report.id.0.clone())
                .or_insert_with(|| DeviceDescriptor::new(report.id.clone()))
                .apply_report(&report);
        }
    }

    /// Create-or-update an entry from a LAN announcement; `host` is replaced
    pub async fn merge_local(&self, id: &DeviceId, state: &Params, host: Option<String>) {
        let mut devices = self.devices.write().await;
        devices
            .entry(id.0.clone())
            .or_insert_with(|| DeviceDescriptor::new(id.clone()))
            .apply_local(state, host);
    }

    /// Overlay per-device user configuration. Never dispatches.
    pub async fn attach_existing(&self, overrides: &HashMap<String, DeviceOverride>) {
        let mut devices = self.devices.write().await;
        for (id, config) in overrides {
            devices
                .entry(id.clone())
                .or_insert_with(|| DeviceDescriptor::new(DeviceId::new(id.clone())))
                .apply_override(config);
        }
        if !overrides.is_empty() {
            debug!(count = overrides.len(), "Applied device overrides");
        }
    }

    /// Idempotent registration entry point, called on every sighting.
    ///
    /// The first call for an id marks it dispatched and queues one
    /// notification per resolved capability; later calls only merge `state`.
    /// The check and the flag flip happen under a single write lock.
    pub async fn register_device(&self, id: &DeviceId, state: &Params) {
        let dispatches = {
            let mut devices = self.devices.write().await;
            let device = devices
                .entry(id.0.clone())
                .or_insert_with(|| DeviceDescriptor::new(id.clone()));
            device.merge_params(state);

            if device.dispatched {
                return;
            }
            device.dispatched = true;

            if device.is_excluded() {
                debug!(device = %id, "Device excluded by configuration");
                return;
            }

            if device.extra.is_none() {
                device.extra = Some(device.derive_extra());
            }
            let available = device.is_available();
            let params = public_state(&device.params);

            if self.options.debug.traces(id.as_str()) {
                debug!(
                    device = %id,
                    uiid = ?device.uiid,
                    extra = ?device.extra,
                    params = ?params,
                    "Init"
                );
            }

            classify(device, &self.options.default_class)
                .into_iter()
                .map(|capability| Dispatch {
                    kind: capability.kind,
                    info: DispatchInfo {
                        device_id: id.clone(),
                        channel: capability.channel,
                        name: device.display_name().map(str::to_string),
                        available,
                        force_update: device.force_update,
                        uiid: device.uiid.clone(),
                        extra: device.extra.clone(),
                        params: params.clone(),
                    },
                })
                .collect::<Vec<_>>()
        };

        for dispatch in dispatches {
            self.dispatch.submit(dispatch);
        }
    }

    /// Register every device the cloud has described, tagging its connection state
    pub async fn register_known_devices(&self) {
        let known: Vec<(DeviceId, bool)> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| !d.params.is_empty())
            .map(|d| (d.id.clone(), d.online))
            .collect();

        for (id, online) in known {
            let mut state = Params::new();
            let conn = if online { "online" } else { "offline" };
            state.insert("cloud".to_string(), Value::from(conn));
            self.register_device(&id, &state).await;
        }
    }

    /// Send a raw command through the transport that owns `id`
    pub async fn send(&self, id: &DeviceId, command: &Command) -> Result<()> {
        let (transport, target) = {
            let devices = self.devices.read().await;
            let device = devices
                .get(id.as_str())
                .ok_or_else(|| RegistryError::UnknownDevice(id.clone()))?;
            let transport = select_transport(
                device,
                self.local_active.load(Ordering::SeqCst),
                self.cloud_active.load(Ordering::SeqCst),
            )
            .ok_or_else(|| RegistryError::NoRoute(id.clone()))?;
            let target = device.host.clone().map(|host| LocalTarget {
                id: id.clone(),
                host,
                device_key: device.lan_key().map(str::to_string),
            });
            (transport, target)
        };

        debug!(device = %id, transport = ?transport, command = ?command, "Sending command");
        match (transport, target) {
            (Transport::Local, Some(target)) => self.local.send(&target, command).await?,
            _ => self.cloud.send(id, command).await?,
        }
        Ok(())
    }

    /// Log in and merge the account's device list. Returns false, with a
    /// warning, when the cloud is unavailable; the registry then keeps
    /// running on the LAN alone.
    pub async fn start_cloud(&self, credentials: &Credentials) -> bool {
        if let Err(e) = self.authenticate(credentials).await {
            warn!(error = %e, "Can't connect to cloud");
            return false;
        }
        self.cloud_active.store(true, Ordering::SeqCst);

        match self.cloud.list_devices().await {
            Ok(reports) => {
                info!(count = reports.len(), "Loaded devices from cloud");
                self.merge_cloud(reports).await;
            }
            Err(e) => warn!(error = %e, "Failed to load device list from cloud"),
        }
        true
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        if self.cloud.login(credentials).await? {
            info!(user = %credentials.username, "Logged in to cloud");
            Ok(())
        } else {
            Err(RegistryError::AuthenticationFailed)
        }
    }

    /// Subscribe to cloud updates; each one is merged and registered
    pub async fn start_cloud_events(self: &Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<DeviceReport>(EVENT_QUEUE_DEPTH);
        self.cloud.start(tx).await?;

        let registry = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let id = report.id.clone();
                let params = report.params.clone();
                registry.merge_cloud(vec![report]).await;
                registry.register_device(&id, &params).await;
            }
        });
        self.tasks.lock().await.push(handle);
        info!("Cloud updates started");
        Ok(())
    }

    /// Start LAN discovery; each announcement is merged and registered
    pub async fn start_local(self: &Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<LocalAnnouncement>(EVENT_QUEUE_DEPTH);
        self.local.start(tx).await?;
        self.local_active.store(true, Ordering::SeqCst);

        let registry = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(LocalAnnouncement { id, state, host }) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let reachable = host.is_some();
                registry.merge_local(&id, &state, host).await;
                if reachable {
                    registry.register_device(&id, &state).await;
                } else {
                    debug!(device = %id, "Device left the local network");
                }
            }
        });
        self.tasks.lock().await.push(handle);
        info!("Local discovery started");
        Ok(())
    }

    /// Tear down both transports. Safe to call more than once; queued
    /// dispatches are still delivered.
    pub async fn stop(&self) {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        if self.local_active.swap(false, Ordering::SeqCst) {
            self.local.stop().await;
            info!("Local discovery stopped");
        }
        if self.cloud_active.swap(false, Ordering::SeqCst) {
            self.cloud.stop().await;
            info!("Cloud connection stopped");
        }
    }

    pub fn is_cloud_active(&self) -> bool {
        self.cloud_active.load(Ordering::SeqCst)
    }

    pub fn is_local_active(&self) -> bool {
        self.local_active.load(Ordering::SeqCst)
    }

    /// Get a device by id
    pub async fn get(&self, id: &str) -> Option<DeviceDescriptor> {
        self.devices.read().await.get(id).cloned()
    }

    /// All known devices
    pub async fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Copy of the whole map, for persisting
    pub async fn snapshot(&self) -> DeviceMap {
        self.devices.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransportError;
    use crate::testing::{FakeCloud, FakeLocal, Recorded, RecordingSink};
    use plugsync_core::{DeclaredClass, Uiid};
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn registry_with(
        cloud: Arc<FakeCloud>,
        local: Arc<FakeLocal>,
    ) -> (Arc<DeviceRegistry>, UnboundedReceiver<Recorded>) {
        let (sink, rx) = RecordingSink::new();
        let registry = DeviceRegistry::new(cloud, local, sink, RegistryOptions::default());
        (registry, rx)
    }

    fn registry() -> (Arc<DeviceRegistry>, UnboundedReceiver<Recorded>) {
        registry_with(FakeCloud::rejecting(), FakeLocal::new())
    }

    fn id(s: &str) -> DeviceId {
        DeviceId::from(s)
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (registry, mut rx) = registry();
        let device = id("1000000001");

        registry
            .register_device(&device, &params(json!({"switch": "on"})))
            .await;
        registry
            .register_device(&device, &params(json!({"switch": "off"})))
            .await;

        let dispatched = RecordingSink::collect(&mut rx, 1).await;
        assert_eq!(dispatched[0].0.as_str(), "switch");
        assert_eq!(dispatched[0].1.channel, None);

        let stored = registry.get("1000000001").await.unwrap();
        assert!(stored.dispatched);
        assert_eq!(stored.params["switch"], json!("off"));
    }

    #[tokio::test]
    async fn test_concurrent_sightings_dispatch_once() {
        let (registry, mut rx) = registry();
        let state = params(json!({"switches": []}));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                registry.register_device(&id("1000000001"), &state).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let dispatched = RecordingSink::collect(&mut rx, 4).await;
        let mut channels: Vec<_> = dispatched.iter().map(|(_, info)| info.channel).collect();
        channels.sort();
        assert_eq!(channels, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_excluded_device_is_never_dispatched() {
        let (registry, mut rx) = registry();
        let mut overrides = HashMap::new();
        overrides.insert(
            "1000000001".to_string(),
            DeviceOverride {
                device_class: Some("exclude".into()),
                ..Default::default()
            },
        );
        registry.attach_existing(&overrides).await;

        for _ in 0..3 {
            registry
                .register_device(&id("1000000001"), &params(json!({"switch": "on"})))
                .await;
        }
        RecordingSink::assert_quiet(&mut rx).await;
        assert!(registry.get("1000000001").await.unwrap().dispatched);
    }

    #[tokio::test]
    async fn test_list_override_dispatches_each_channel() {
        let (registry, mut rx) = registry();
        let mut overrides = HashMap::new();
        overrides.insert(
            "1000000001".to_string(),
            DeviceOverride {
                device_class: Some(DeclaredClass::Multi(vec![
                    "a".into(),
                    "b".into(),
                    "c".into(),
                    "d".into(),
                ])),
                ..Default::default()
            },
        );
        registry.attach_existing(&overrides).await;
        RecordingSink::assert_quiet(&mut rx).await;

        registry
            .register_device(&id("1000000001"), &Params::new())
            .await;

        let dispatched = RecordingSink::collect(&mut rx, 4).await;
        let expected = ["a", "b", "c", "d"];
        for (i, ((kind, info), expected)) in dispatched.iter().zip(expected).enumerate() {
            assert_eq!(kind.as_str(), expected);
            assert_eq!(info.channel, Some(i as u8));
        }
    }

    #[tokio::test]
    async fn test_dispatch_metadata() {
        let (registry, mut rx) = registry();
        let mut report = DeviceReport::new("1000000001");
        report.online = Some(true);
        report.name = Some("Kitchen".into());
        report.uiid = Some(Uiid::Number(1));
        report.brand_name = Some("SONOFF".into());
        registry.merge_cloud(vec![report]).await;

        registry
            .register_device(
                &id("1000000001"),
                &params(json!({"switch": "on", "partnerDevice": {"id": "abcdef"}})),
            )
            .await;

        let dispatched = RecordingSink::collect(&mut rx, 1).await;
        let info = &dispatched[0].1;
        assert!(info.available);
        assert_eq!(info.name.as_deref(), Some("Kitchen"));
        assert!(!info.params.contains_key("partnerDevice"));
        assert_eq!(
            info.extra.as_ref().and_then(|e| e.manufacturer.as_deref()),
            Some("SONOFF")
        );
    }

    #[tokio::test]
    async fn test_extra_is_write_once() {
        let (registry, mut rx) = registry();
        registry
            .register_device(&id("1000000001"), &params(json!({"switch": "on"})))
            .await;
        RecordingSink::collect(&mut rx, 1).await;

        let first = registry.get("1000000001").await.unwrap().extra;
        let mut report = DeviceReport::new("1000000001");
        report.brand_name = Some("Other".into());
        registry.merge_cloud(vec![report]).await;
        registry
            .register_device(&id("1000000001"), &Params::new())
            .await;

        assert_eq!(registry.get("1000000001").await.unwrap().extra, first);
    }

    #[tokio::test]
    async fn test_local_announcement_registers_device() {
        let local = FakeLocal::new();
        let (registry, mut rx) = registry_with(FakeCloud::rejecting(), local.clone());
        registry.start_local().await.unwrap();

        local
            .announce("1000000001", params(json!({"switch": "on"})), Some("10.0.0.5"))
            .await;
        local
            .announce("1000000001", params(json!({"switch": "off"})), Some("10.0.0.5"))
            .await;

        let dispatched = RecordingSink::collect(&mut rx, 1).await;
        assert!(dispatched[0].1.available);

        let stored = registry.get("1000000001").await.unwrap();
        assert_eq!(stored.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(stored.params["switch"], json!("off"));
    }

    #[tokio::test]
    async fn test_cloud_events_merge_and_register() {
        let cloud = FakeCloud::accepting(Vec::new());
        let (registry, mut rx) = registry_with(cloud.clone(), FakeLocal::new());
        let credentials = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        assert!(registry.start_cloud(&credentials).await);
        registry.start_cloud_events().await.unwrap();

        let mut report = DeviceReport::new("1000000001");
        report.online = Some(true);
        report.params = params(json!({"switch": "on"}));
        cloud.push(report).await;

        let dispatched = RecordingSink::collect(&mut rx, 1).await;
        assert_eq!(dispatched[0].1.device_id.as_str(), "1000000001");
        assert!(registry.get("1000000001").await.unwrap().online);
    }

    #[tokio::test]
    async fn test_register_known_devices_tags_cloud_state() {
        let mut online = DeviceReport::new("1000000001");
        online.online = Some(true);
        online.params = params(json!({"switch": "on"}));
        let mut offline = DeviceReport::new("1000000002");
        offline.online = Some(false);
        offline.params = params(json!({"switch": "off"}));
        let bare = DeviceReport::new("1000000003");

        let (registry, mut rx) = registry();
        registry.merge_cloud(vec![online, offline, bare]).await;
        registry.register_known_devices().await;

        RecordingSink::collect(&mut rx, 2).await;
        assert_eq!(
            registry.get("1000000001").await.unwrap().params["cloud"],
            json!("online")
        );
        assert_eq!(
            registry.get("1000000002").await.unwrap().params["cloud"],
            json!("offline")
        );
        assert!(!registry.get("1000000003").await.unwrap().dispatched);
    }

    #[tokio::test]
    async fn test_send_unknown_device() {
        let (registry, _rx) = registry();
        let err = registry
            .send(&id("1000000001"), &Command::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDevice(_)));
    }

    #[tokio::test]
    async fn test_send_prefers_local_when_host_known() {
        let cloud = FakeCloud::accepting(Vec::new());
        let local = FakeLocal::new();
        let (registry, _rx) = registry_with(cloud.clone(), local.clone());
        let credentials = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        registry.start_cloud(&credentials).await;
        registry.start_local().await.unwrap();

        let mut report = DeviceReport::new("1000000001");
        report.online = Some(true);
        registry.merge_cloud(vec![report]).await;

        registry
            .send(&id("1000000001"), &Command::new())
            .await
            .unwrap();
        assert_eq!(cloud.sent.lock().unwrap().len(), 1);

        registry
            .merge_local(&id("1000000001"), &Params::new(), Some("10.0.0.5".into()))
            .await;
        registry
            .send(&id("1000000001"), &Command::new())
            .await
            .unwrap();
        let sent = local.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.host, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_send_propagates_transport_error() {
        let local = FakeLocal::failing();
        let (registry, _rx) = registry_with(FakeCloud::rejecting(), local.clone());
        registry.start_local().await.unwrap();
        registry
            .merge_local(&id("1000000001"), &Params::new(), Some("10.0.0.5".into()))
            .await;

        let err = registry
            .send(&id("1000000001"), &Command::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Transport(TransportError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_route() {
        let (registry, _rx) = registry();
        registry
            .merge_local(&id("1000000001"), &Params::new(), Some("10.0.0.5".into()))
            .await;
        let err = registry
            .send(&id("1000000001"), &Command::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoRoute(_)));
    }

    #[tokio::test]
    async fn test_start_cloud_rejected() {
        let cloud = FakeCloud::rejecting();
        let (registry, _rx) = registry_with(cloud.clone(), FakeLocal::new());
        let credentials = Credentials {
            username: "u".into(),
            password: "bad".into(),
        };
        assert!(!registry.start_cloud(&credentials).await);
        assert!(!registry.is_cloud_active());
        assert_eq!(cloud.logins(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let cloud = FakeCloud::accepting(Vec::new());
        let local = FakeLocal::new();
        let (registry, _rx) = registry_with(cloud.clone(), local.clone());
        let credentials = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        registry.start_cloud(&credentials).await;
        registry.start_local().await.unwrap();

        registry.stop().await;
        registry.stop().await;

        assert_eq!(local.stops.load(Ordering::SeqCst), 1);
        assert_eq!(cloud.stops.load(Ordering::SeqCst), 1);
        assert!(!registry.is_local_active());
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(".plugsync.json");

        let (first, _rx) = registry();
        assert_eq!(first.load_cache(&path).await, 0);

        let mut report = DeviceReport::new("1000000001");
        report.params = params(json!({"switch": "on"}));
        first.merge_cloud(vec![report]).await;
        first.save_to(&JsonFileCache::new(&path)).await.unwrap();

        let (restored, _rx) = registry();
        assert_eq!(restored.load_cache(&path).await, 1);
        assert_eq!(
            restored.get("1000000001").await.unwrap().params["switch"],
            json!("on")
        );
    }

    #[tokio::test]
    async fn test_removed_override_does_not_survive_restart() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let cache = JsonFileCache::new(temp_dir.path().join(".plugsync.json"));

        let (first, mut first_rx) = registry();
        let mut report = DeviceReport::new("1000000001");
        report.online = Some(true);
        report.params = params(json!({"switch": "on"}));
        first.merge_cloud(vec![report]).await;

        let mut overrides = HashMap::new();
        overrides.insert(
            "1000000001".to_string(),
            DeviceOverride {
                device_class: Some("exclude".into()),
                name: Some("Hidden".into()),
                ..Default::default()
            },
        );
        first.attach_existing(&overrides).await;
        first
            .register_device(&id("1000000001"), &Params::new())
            .await;
        RecordingSink::assert_quiet(&mut first_rx).await;
        first.save_to(&cache).await.unwrap();

        // Second run with the override removed from configuration
        let (second, mut second_rx) = registry();
        assert_eq!(second.seed_from(&cache).await, 1);
        second.attach_existing(&HashMap::new()).await;
        second
            .register_device(&id("1000000001"), &Params::new())
            .await;

        let dispatched = RecordingSink::collect(&mut second_rx, 1).await;
        assert_eq!(dispatched[0].0.as_str(), "switch");
        assert_eq!(dispatched[0].1.name, None);
        assert!(second.get("1000000001").await.unwrap().declared_class.is_none());
    }

    #[test]
    fn test_select_transport() {
        let mut device = DeviceDescriptor::new(id("1000000001"));
        assert_eq!(select_transport(&device, true, true), None);

        device.online = true;
        assert_eq!(select_transport(&device, true, true), Some(Transport::Cloud));
        assert_eq!(select_transport(&device, true, false), None);

        device.host = Some("10.0.0.5".into());
        assert_eq!(select_transport(&device, true, true), Some(Transport::Local));
        assert_eq!(select_transport(&device, false, true), Some(Transport::Cloud));
    }
}
