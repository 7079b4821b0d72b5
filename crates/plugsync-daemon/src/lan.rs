//! LAN channel
//!
//! Devices announce themselves with JSON datagrams on the local network:
//!
//! ```json
//! {"deviceid": "1000abcdef", "params": {"switch": "on"}}
//! {"deviceid": "1000abcdef", "bye": true}
//! ```
//!
//! The datagram's source address becomes the device host. A `bye` message
//! means the device left the network. Commands go straight to the device over
//! HTTP at `http://{host}:{command_port}/zeroconf/{endpoint}`.

use anyhow::Context;
use async_trait::async_trait;
use plugsync_core::{Command, DeviceId, Params};
use plugsync_registry::{LocalAnnouncement, LocalChannel, LocalTarget, TransportError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

const MAX_DATAGRAM: usize = 4096;

const RECEIVE_RETRY_BASE: Duration = Duration::from_millis(100);
const RECEIVE_RETRY_MAX: Duration = Duration::from_secs(5);

/// Command keys that have their own device endpoint, most specific first
const COMMAND_ENDPOINTS: &[&str] = &["switches", "switch", "pulse", "startup", "sledOnline"];

#[derive(Deserialize)]
struct Datagram {
    deviceid: DeviceId,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    bye: bool,
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    deviceid: &'a str,
    sequence: String,
    #[serde(rename = "selfApikey", skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
    data: &'a Command,
}

#[derive(Deserialize)]
struct CommandResponse {
    #[serde(default)]
    error: i64,
}

/// Parse one announcement datagram received from `source`
pub fn parse_announcement(payload: &[u8], source: SocketAddr) -> Option<LocalAnnouncement> {
    let datagram: Datagram = match serde_json::from_slice(payload) {
        Ok(datagram) => datagram,
        Err(e) => {
            trace!(source = %source, error = %e, "Ignoring malformed datagram");
            return None;
        }
    };

    Some(LocalAnnouncement {
        id: datagram.deviceid,
        state: datagram.params,
        host: (!datagram.bye).then(|| source.ip().to_string()),
    })
}

/// Device endpoint for a command, picked from the first recognised key
pub fn command_endpoint(command: &Command) -> &'static str {
    COMMAND_ENDPOINTS
        .iter()
        .find(|key| command.contains_key(**key))
        .copied()
        .unwrap_or("info")
}

/// Pause after `failures` consecutive receive errors, doubling up to a cap
pub fn receive_retry_delay(failures: u32) -> Duration {
    RECEIVE_RETRY_BASE
        .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
        .min(RECEIVE_RETRY_MAX)
}

/// LAN channel over UDP announcements and HTTP commands
pub struct UdpLocalChannel {
    bind: SocketAddr,
    command_port: u16,
    client: reqwest::Client,
    listener: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl UdpLocalChannel {
    pub fn new(bind: SocketAddr, command_port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            bind,
            command_port,
            client,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn listen(socket: UdpSocket, events: mpsc::Sender<LocalAnnouncement>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut failures = 0u32;
    loop {
        let (len, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => {
                failures = 0;
                received
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = receive_retry_delay(failures);
                warn!(error = %e, retry_ms = delay.as_millis() as u64, "LAN receive failed");
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let Some(announcement) = parse_announcement(&buf[..len], source) else {
            continue;
        };
        trace!(device = %announcement.id, host = ?announcement.host, "LAN announcement");

        if events.send(announcement).await.is_err() {
            debug!("LAN event consumer gone, stopping listener");
            return;
        }
    }
}

#[async_trait]
impl LocalChannel for UdpLocalChannel {
    async fn start(&self, events: mpsc::Sender<LocalAnnouncement>) -> Result<(), TransportError> {
        let socket = UdpSocket::bind(self.bind).await?;
        let addr = socket.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(addr);

        let handle = tokio::spawn(listen(socket, events));
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        info!(address = %addr, "LAN discovery listening");
        Ok(())
    }

    async fn send(&self, target: &LocalTarget, command: &Command) -> Result<(), TransportError> {
        let url = format!(
            "http://{}:{}/zeroconf/{}",
            target.host,
            self.command_port,
            command_endpoint(command)
        );
        let request = CommandRequest {
            deviceid: target.id.as_str(),
            sequence: chrono::Utc::now().timestamp_millis().to_string(),
            api_key: target.device_key.as_deref(),
            data: command,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(url.clone())
                } else {
                    TransportError::Other(e.into())
                }
            })?;

        let body: CommandResponse = response
            .error_for_status()
            .map_err(|e| TransportError::Other(e.into()))?
            .json()
            .await
            .map_err(|e| TransportError::Other(e.into()))?;

        if body.error != 0 {
            return Err(TransportError::Rejected(
                target.id.clone(),
                format!("LAN error {}", body.error),
            ));
        }
        debug!(device = %target.id, host = %target.host, "LAN command accepted");
        Ok(())
    }

    async fn stop(&self) {
        let listener = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = listener {
            handle.abort();
            info!(address = ?self.local_addr(), "LAN discovery stopped");
        }
    }
}
