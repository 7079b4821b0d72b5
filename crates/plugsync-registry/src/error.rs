//! Registry error types

use plugsync_core::{CacheError, DeviceId};
use thiserror::Error;

use crate::channel::TransportError;

/// A result type using `RegistryError`.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by the registry, router, and startup sequence.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The device cache could not be read or written. Startup continues empty.
    #[error("device cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    /// The cloud rejected the credentials. Startup continues local-only.
    #[error("cloud authentication failed")]
    AuthenticationFailed,

    /// The requested mode cannot be satisfied with the given configuration.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The id is not in the registry.
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The id has no recognised shape.
    #[error("invalid device identifier: {0:?}")]
    InvalidIdentifier(String),

    /// No running transport can reach the device.
    #[error("no running transport can reach device {0}")]
    NoRoute(DeviceId),

    /// Failure reported by the owning transport, not retried.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl RegistryError {
    /// Only a configuration that makes the requested mode impossible is fatal.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigurationInvalid(_))
    }
}
