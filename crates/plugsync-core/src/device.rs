//! Device descriptors and the merge rules used to reconcile channel reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::EXCLUDE_CLASS;
use crate::options::DeviceOverride;

/// Live device state as reported by a channel (`switch`, `switches`, sensor fields, ...)
pub type Params = serde_json::Map<String, Value>;

/// Raw outbound command payload
pub type Command = serde_json::Map<String, Value>;

/// Length of identifiers assigned to standard (switch/plug/sensor) devices
pub const STANDARD_ID_LEN: usize = 10;

/// Length of identifiers assigned to camera-class devices
pub const CAMERA_ID_LEN: usize = 6;

/// State fields that belong to a transport and are never passed downstream
pub const PRIVATE_STATE_FIELDS: &[&str] = &["partnerDevice"];

/// Unique identifier for a device, identical across cloud and LAN reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

/// Device family implied by the shape of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Regular device reachable through the cloud or LAN transports
    Standard,
    /// Camera reachable only through the camera transport
    Camera,
    /// Identifier of an unsupported length
    Invalid,
}

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the identifier by its length.
    ///
    /// The length is the only routing signal the vendor gives us, so this is
    /// the single place that knows about it.
    pub fn kind(&self) -> IdKind {
        match self.0.chars().count() {
            STANDARD_ID_LEN => IdKind::Standard,
            CAMERA_ID_LEN => IdKind::Camera,
            _ => IdKind::Invalid,
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// User-declared capability class, either one kind or one kind per channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeclaredClass {
    Single(String),
    Multi(Vec<String>),
}

impl DeclaredClass {
    /// True for the `exclude` sentinel
    pub fn is_exclude(&self) -> bool {
        matches!(self, Self::Single(class) if class == EXCLUDE_CLASS)
    }
}

impl From<&str> for DeclaredClass {
    fn from(class: &str) -> Self {
        Self::Single(class.to_string())
    }
}

/// Capability-family tag from the cloud, sent either as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uiid {
    Number(u32),
    Text(String),
}

impl Uiid {
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Diagnostic information collected once, when a device is first registered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceExtra {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    /// Device had a LAN address when registered
    pub local: bool,
    /// Device was online in the cloud when registered
    pub cloud: bool,
}

/// A device as reported by a channel.
///
/// Every field except the id is optional: absent fields leave the registry's
/// copy untouched when the report is merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    #[serde(rename = "deviceid")]
    pub id: DeviceId,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uiid: Option<Uiid>,
    #[serde(default, rename = "brandName")]
    pub brand_name: Option<String>,
    #[serde(default, rename = "productModel")]
    pub product_model: Option<String>,
    #[serde(default, rename = "devicekey")]
    pub device_key: Option<String>,
    #[serde(default)]
    pub params: Params,
}

impl DeviceReport {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(id),
            ..Default::default()
        }
    }
}

/// Registry record for one physical device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(rename = "deviceid")]
    pub id: DeviceId,
    /// Cloud-reported reachability
    #[serde(default)]
    pub online: bool,
    /// LAN address; only meaningful while the process runs
    #[serde(skip)]
    pub host: Option<String>,
    /// Class from user configuration; never persisted
    #[serde(skip)]
    pub declared_class: Option<DeclaredClass>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub uiid: Option<Uiid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "brandName")]
    pub brand_name: Option<String>,
    #[serde(default, rename = "productModel")]
    pub product_model: Option<String>,
    #[serde(default, rename = "devicekey")]
    pub device_key: Option<String>,
    #[serde(skip)]
    pub force_update: bool,
    /// User configuration applied this run; never persisted
    #[serde(skip)]
    pub overlay: DeviceOverride,
    /// Set once registration has been emitted for this process
    #[serde(skip)]
    pub dispatched: bool,
    #[serde(skip)]
    pub extra: Option<DeviceExtra>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceDescriptor {
    /// Create an empty descriptor on first sighting
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            online: false,
            host: None,
            declared_class: None,
            params: Params::new(),
            uiid: None,
            name: None,
            brand_name: None,
            product_model: None,
            device_key: None,
            force_update: false,
            overlay: DeviceOverride::default(),
            dispatched: false,
            extra: None,
            last_seen: None,
        }
    }

    /// Merge a channel report: present fields overwrite, absent fields are kept
    pub fn apply_report(&mut self, report: &DeviceReport) {
        if let Some(online) = report.online {
            self.online = online;
        }
        if let Some(name) = &report.name {
            self.name = Some(name.clone());
        }
        if let Some(uiid) = &report.uiid {
            self.uiid = Some(uiid.clone());
        }
        if let Some(brand) = &report.brand_name {
            self.brand_name = Some(brand.clone());
        }
        if let Some(model) = &report.product_model {
            self.product_model = Some(model.clone());
        }
        if let Some(key) = &report.device_key {
            self.device_key = Some(key.clone());
        }
        self.merge_params(&report.params);
        self.touch();
    }

    /// Merge a LAN announcement; `host` reflects current local reachability
    pub fn apply_local(&mut self, state: &Params, host: Option<String>) {
        self.host = host;
        self.merge_params(state);
        self.touch();
    }

    /// Overlay user configuration. Does not touch live state or the
    /// transport-reported name and key, so nothing from config reaches the
    /// cache.
    pub fn apply_override(&mut self, config: &DeviceOverride) {
        if let Some(class) = &config.device_class {
            self.declared_class = Some(class.clone());
        }
        if let Some(force) = config.force_update {
            self.force_update = force;
        }
        self.overlay = config.clone();
    }

    /// Configured name, else the reported one
    pub fn display_name(&self) -> Option<&str> {
        self.overlay.name.as_deref().or(self.name.as_deref())
    }

    /// Configured LAN key, else the reported one
    pub fn lan_key(&self) -> Option<&str> {
        self.overlay
            .device_key
            .as_deref()
            .or(self.device_key.as_deref())
    }

    /// Key-wise merge of live state, last writer wins per key
    pub fn merge_params(&mut self, state: &Params) {
        for (key, value) in state {
            self.params.insert(key.clone(), value.clone());
        }
    }

    /// Pure form of [`apply_report`](Self::apply_report)
    pub fn merged(mut self, report: &DeviceReport) -> Self {
        self.apply_report(report);
        self
    }

    /// Reachable through at least one transport
    pub fn is_available(&self) -> bool {
        self.online || self.host.is_some()
    }

    pub fn is_excluded(&self) -> bool {
        self.declared_class
            .as_ref()
            .is_some_and(DeclaredClass::is_exclude)
    }

    /// Build diagnostic info from the current metadata
    pub fn derive_extra(&self) -> DeviceExtra {
        let sw_version = self.params.get("fwVersion").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        DeviceExtra {
            manufacturer: self.brand_name.clone(),
            model: self.product_model.clone(),
            sw_version,
            local: self.host.is_some(),
            cloud: self.online,
        }
    }

    /// Update the last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Some(Utc::now());
    }
}

/// Copy of `state` without transport-private fields
pub fn public_state(state: &Params) -> Params {
    state
        .iter()
        .filter(|(key, _)| !PRIVATE_STATE_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
