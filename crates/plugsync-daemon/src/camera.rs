//! Camera channel
//!
//! Cameras take short string commands (`up`, `down`, `left`, `right`, ...)
//! broadcast over UDP and addressed by their short identifier.

use async_trait::async_trait;
use plugsync_core::{Command, DeviceId};
use plugsync_registry::{CameraChannel, TransportError};
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

#[derive(Serialize)]
struct CameraDatagram<'a> {
    deviceid: &'a str,
    cmd: &'a str,
}

/// Build the datagram for one camera command
pub fn encode_command(id: &DeviceId, command: &Command) -> Result<Vec<u8>, TransportError> {
    let cmd = command
        .get("cmd")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            TransportError::Rejected(id.clone(), "camera command needs a cmd string".into())
        })?;

    let datagram = CameraDatagram {
        deviceid: id.as_str(),
        cmd,
    };
    serde_json::to_vec(&datagram).map_err(|e| TransportError::Other(e.into()))
}

/// Camera channel over UDP broadcast
pub struct UdpCameraChannel {
    target: SocketAddr,
}

impl UdpCameraChannel {
    pub fn new(port: u16) -> Self {
        Self::with_target(SocketAddr::from((Ipv4Addr::BROADCAST, port)))
    }

    /// Send to a fixed address instead of broadcasting
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

#[async_trait]
impl CameraChannel for UdpCameraChannel {
    async fn send(&self, id: &DeviceId, command: &Command) -> Result<(), TransportError> {
        let payload = encode_command(id, command)?;

        let bind = if self.target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.set_broadcast(true)?;
        socket.send_to(&payload, self.target).await?;

        debug!(camera = %id, target = %self.target, "Camera command sent");
        Ok(())
    }
}
