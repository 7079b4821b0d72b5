//! HTTP cloud channel
//!
//! Talks to the vendor cloud over its REST API:
//! - `POST /api/user/login` exchanges credentials for a bearer token
//! - `GET /api/user/device` returns the account's device list
//! - `POST /api/user/device/status` pushes new params to one device
//!
//! Updates are polled on a fixed interval and delivered as device reports.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use plugsync_core::{Command, Credentials, DeviceId, DeviceReport};
use plugsync_registry::{CloudChannel, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    at: Option<String>,
    #[serde(default)]
    error: i64,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    devicelist: Vec<DeviceReport>,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    deviceid: &'a str,
    params: &'a Command,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    msg: Option<String>,
}

/// Cloud channel backed by the vendor REST API
pub struct HttpCloudChannel {
    client: reqwest::Client,
    api_url: String,
    scan_interval: Duration,
    token: Arc<RwLock<Option<String>>>,
    poller: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HttpCloudChannel {
    pub fn new(api_url: impl Into<String>, scan_interval: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            scan_interval,
            token: Arc::new(RwLock::new(None)),
            poller: std::sync::Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn bearer(&self) -> Result<String, TransportError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)
    }
}

async fn fetch_devices(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> Result<Vec<DeviceReport>, TransportError> {
    let response: DeviceListResponse = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(request_error)?
        .error_for_status()
        .map_err(request_error)?
        .json()
        .await
        .map_err(request_error)?;

    if response.error != 0 {
        return Err(anyhow!("device list failed with error {}", response.error).into());
    }
    Ok(response.devicelist)
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.url().map(|u| u.to_string()).unwrap_or_default())
    } else {
        TransportError::Other(e.into())
    }
}

#[async_trait]
impl CloudChannel for HttpCloudChannel {
    async fn login(&self, credentials: &Credentials) -> Result<bool, TransportError> {
        let response = self
            .client
            .post(self.url("/api/user/login"))
            .json(&LoginRequest {
                email: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(false);
        }

        let body: LoginResponse = response
            .error_for_status()
            .map_err(request_error)?
            .json()
            .await
            .map_err(request_error)?;

        match body.at {
            Some(token) if body.error == 0 => {
                *self.token.write().await = Some(token);
                info!(user = %credentials.username, "Cloud login succeeded");
                Ok(true)
            }
            _ => {
                debug!(error = body.error, "Cloud login rejected");
                Ok(false)
            }
        }
    }

    async fn list_devices(&self) -> Result<Vec<DeviceReport>, TransportError> {
        let token = self.bearer().await?;
        let devices = fetch_devices(&self.client, &self.url("/api/user/device"), &token).await?;
        debug!(count = devices.len(), "Fetched cloud device list");
        Ok(devices)
    }

    async fn start(&self, events: mpsc::Sender<DeviceReport>) -> Result<(), TransportError> {
        let token = self.bearer().await?;
        let client = self.client.clone();
        let url = self.url("/api/user/device");
        let interval = self.scan_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the initial list was already merged
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match fetch_devices(&client, &url, &token).await {
                    Ok(devices) => {
                        for report in devices {
                            if events.send(report).await.is_err() {
                                debug!("Cloud event consumer gone, stopping poller");
                                return;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Cloud poll failed"),
                }
            }
        });

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "Cloud polling started");
        Ok(())
    }

    async fn send(&self, id: &DeviceId, command: &Command) -> Result<(), TransportError> {
        let token = self.bearer().await?;
        let body: StatusResponse = self
            .client
            .post(self.url("/api/user/device/status"))
            .bearer_auth(token)
            .json(&StatusRequest {
                deviceid: id.as_str(),
                params: command,
            })
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .json()
            .await
            .map_err(request_error)?;

        if body.error != 0 {
            let reason = body.msg.unwrap_or_else(|| format!("error {}", body.error));
            return Err(TransportError::Rejected(id.clone(), reason));
        }
        debug!(device = %id, "Cloud command accepted");
        Ok(())
    }

    async fn stop(&self) {
        let poller = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = poller {
            handle.abort();
        }
        *self.token.write().await = None;
        info!("Cloud channel stopped");
    }
}
