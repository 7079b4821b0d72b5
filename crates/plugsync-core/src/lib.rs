//! plugsync Core - Device descriptors, capability classification, and device cache
//!
//! This crate provides the foundational types for the plugsync system:
//! - Device descriptors and the field-wise merge used to reconcile cloud and LAN reports
//! - Capability classification of a descriptor into dispatchable component kinds
//! - The JSON device cache that seeds the registry on startup
//! - Shared configuration vocabulary (operating mode, reload policy, overrides)

pub mod cache;
pub mod classify;
pub mod device;
pub mod options;

pub use cache::{CacheError, CacheStore, DeviceMap, JsonFileCache};
pub use classify::{classify, Capability, ComponentKind, BINARY_DEVICE_CLASSES, EXCLUDE_CLASS};
pub use device::{
    public_state, Command, DeclaredClass, DeviceDescriptor, DeviceExtra, DeviceId, DeviceReport,
    IdKind, Params, Uiid,
};
pub use options::{Credentials, DebugSetting, DeviceOverride, Mode, Reload};
