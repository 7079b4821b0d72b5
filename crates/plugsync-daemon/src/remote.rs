//! One-shot command client for a running daemon

use anyhow::{bail, Context, Result};
use plugsync_core::Command;
use serde_json::Value;
use std::time::Duration;

/// Base URL for reaching a daemon bound to `bind` from this host
pub fn base_url(bind: &str, tls: bool) -> String {
    let host = match bind.strip_prefix("0.0.0.0:") {
        Some(port) => format!("127.0.0.1:{}", port),
        None => bind.to_string(),
    };
    let scheme = if tls { "https" } else { "http" };
    format!("{}://{}", scheme, host)
}

/// Parse a command given on the command line; it must be a JSON object
pub fn parse_command(raw: &str) -> Result<Command> {
    match serde_json::from_str::<Value>(raw).context("Command is not valid JSON")? {
        Value::Object(command) => Ok(command),
        other => bail!("Command must be a JSON object, got {}", other),
    }
}

/// Send `command` to device `id` through the daemon's API
pub async fn send(base_url: &str, id: &str, command: &Command) -> Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .post(format!("{}/api/devices/{}/command", base_url, id))
        .json(command)
        .send()
        .await
        .with_context(|| format!("Failed to reach daemon at {}", base_url))?;

    let status = response.status();
    let body: Value = response.json().await.context("Invalid response from daemon")?;
    if !status.is_success() {
        let reason = body["error"].as_str().unwrap_or("unknown error");
        bail!("Command failed ({}): {}", status, reason);
    }
    Ok(body)
}
