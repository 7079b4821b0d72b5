//! Capability classification
//!
//! Maps a device descriptor to the component kinds it is surfaced as. A device
//! resolves to either one kind for the whole unit (`channel = None`) or one
//! kind per physical channel (`channel = Some(index)`).
//!
//! Resolution tries an ordered list of resolvers and takes the first answer:
//! 1. the user's `device_class` override
//! 2. the vendor family table, keyed by `uiid`
//! 3. the shape of the live state (`switch`, `switches`, anything else)
//!
//! Kind strings are not validated. An unknown kind reaches the dispatch sink
//! unchanged so that newer downstream platforms can be targeted from config.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{DeclaredClass, DeviceDescriptor};

/// Sentinel class that keeps a known device from ever being surfaced
pub const EXCLUDE_CLASS: &str = "exclude";

/// Binary sensor device classes, without `light` (that one is an actuator)
pub const BINARY_DEVICE_CLASSES: &[&str] = &[
    "battery",
    "battery_charging",
    "carbon_monoxide",
    "cold",
    "connectivity",
    "door",
    "garage_door",
    "gas",
    "heat",
    "lock",
    "moisture",
    "motion",
    "moving",
    "occupancy",
    "opening",
    "plug",
    "power",
    "presence",
    "problem",
    "running",
    "safety",
    "smoke",
    "sound",
    "tamper",
    "update",
    "vibration",
    "window",
];

/// Number of relays assumed for a device reporting a `switches` array
const MULTI_SWITCH_CHANNELS: usize = 4;

/// Dual relay device that can run in cover (roller shutter) mode
const DUAL_R3_UIID: u32 = 126;
const DUAL_R3_COVER_MODE: i64 = 2;

/// Category a device or device channel is surfaced as downstream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKind(pub String);

impl ComponentKind {
    pub const SWITCH: &'static str = "switch";
    pub const BINARY_SENSOR: &'static str = "binary_sensor";
    pub const LIGHT: &'static str = "light";
    pub const FAN: &'static str = "fan";
    pub const COVER: &'static str = "cover";
    pub const SENSOR: &'static str = "sensor";
    pub const REMOTE: &'static str = "remote";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn binary_sensor() -> Self {
        Self::new(Self::BINARY_SENSOR)
    }
}

impl Default for ComponentKind {
    fn default() -> Self {
        Self::new(Self::SWITCH)
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One dispatchable unit of a device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub kind: ComponentKind,
    /// `None` for single-channel devices, the 0-based leg otherwise
    pub channel: Option<u8>,
}

/// A resolver either answers or passes to the next one
type Resolver = fn(&DeviceDescriptor, &ComponentKind) -> Option<DeclaredClass>;

const RESOLVERS: &[Resolver] = &[from_override, from_family, from_state];

/// Resolve the capabilities of a device. Deterministic for a given descriptor.
pub fn classify(device: &DeviceDescriptor, default_class: &ComponentKind) -> Vec<Capability> {
    RESOLVERS
        .iter()
        .find_map(|resolve| resolve(device, default_class))
        .map(|class| expand(&class))
        .unwrap_or_default()
}

/// Turn a resolved class into capabilities
pub fn expand(class: &DeclaredClass) -> Vec<Capability> {
    match class {
        DeclaredClass::Single(kind) if kind == EXCLUDE_CLASS => Vec::new(),
        DeclaredClass::Single(kind) => vec![Capability {
            kind: normalize(kind),
            channel: None,
        }],
        DeclaredClass::Multi(kinds) => kinds
            .iter()
            .enumerate()
            .filter_map(|(index, kind)| {
                let channel = u8::try_from(index).ok()?;
                Some(Capability {
                    kind: ComponentKind::new(kind.clone()),
                    channel: Some(channel),
                })
            })
            .collect(),
    }
}

/// Binary-style device classes collapse into the generic binary sensor kind
fn normalize(kind: &str) -> ComponentKind {
    if BINARY_DEVICE_CLASSES.contains(&kind) {
        ComponentKind::binary_sensor()
    } else {
        ComponentKind::new(kind)
    }
}

fn from_override(device: &DeviceDescriptor, _: &ComponentKind) -> Option<DeclaredClass> {
    device.declared_class.clone()
}

fn from_family(device: &DeviceDescriptor, default_class: &ComponentKind) -> Option<DeclaredClass> {
    let uiid = device.uiid.as_ref()?.as_number()?;

    if uiid == DUAL_R3_UIID
        && device.params.get("workMode").and_then(Value::as_i64) == Some(DUAL_R3_COVER_MODE)
    {
        return Some(DeclaredClass::Single(ComponentKind::COVER.to_string()));
    }

    Some(match family(uiid)? {
        Family::Relays(1) => DeclaredClass::Single(default_class.0.clone()),
        Family::Relays(n) => DeclaredClass::Multi(vec![default_class.0.clone(); n]),
        Family::Fixed(kind) => DeclaredClass::Single(kind.to_string()),
        Family::Channels(kinds) => {
            DeclaredClass::Multi(kinds.iter().map(|k| k.to_string()).collect())
        }
    })
}

fn from_state(device: &DeviceDescriptor, default_class: &ComponentKind) -> Option<DeclaredClass> {
    let class = if device.params.contains_key("switch") {
        DeclaredClass::Single(default_class.0.clone())
    } else if device.params.contains_key("switches") {
        DeclaredClass::Multi(vec![default_class.0.clone(); MULTI_SWITCH_CHANNELS])
    } else {
        DeclaredClass::Single(ComponentKind::BINARY_SENSOR.to_string())
    };
    Some(class)
}

/// Vendor device families
enum Family {
    /// Plain relays surfaced with the configured default kind
    Relays(usize),
    Fixed(&'static str),
    /// One fixed kind per channel
    Channels(&'static [&'static str]),
}

fn family(uiid: u32) -> Option<Family> {
    let family = match uiid {
        1 | 5 | 6 | 14 | 15 | 24 | 27 | 32 | 81 | 112 | 138 => Family::Relays(1),
        2 | 7 | 29 | 41 | 77 | 78 | 82 | 126 | 161 => Family::Relays(2),
        3 | 8 | 30 | 83 | 162 => Family::Relays(3),
        4 | 9 | 31 | 84 => Family::Relays(4),
        22 | 25 | 36 | 44 | 57 | 59 | 62 | 103 | 104 => Family::Fixed(ComponentKind::LIGHT),
        34 => Family::Channels(&[ComponentKind::LIGHT, ComponentKind::FAN]),
        11 | 67 => Family::Fixed(ComponentKind::COVER),
        18 => Family::Fixed(ComponentKind::SENSOR),
        102 => Family::Fixed(ComponentKind::BINARY_SENSOR),
        28 => Family::Fixed(ComponentKind::REMOTE),
        _ => return None,
    };
    Some(family)
}
