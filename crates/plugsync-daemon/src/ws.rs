//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use plugsync_core::DeviceId;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::sink::Entity;
use crate::state::AppState;

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "entity_registered")]
    EntityRegistered(Entity),
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Entities already sent to one client, keyed by device and channel
#[derive(Default)]
struct Delivered(HashSet<(DeviceId, Option<u8>)>);

impl Delivered {
    /// True the first time an entity is seen
    fn first(&mut self, entity: &Entity) -> bool {
        self.0.insert((entity.info.device_id.clone(), entity.info.channel))
    }
}

fn encode(msg: &WsMessage) -> Option<Message> {
    serde_json::to_string(msg)
        .ok()
        .map(|json| Message::Text(json.into()))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the snapshot so nothing registered in between is lost;
    // anything in both is only sent once
    let mut events = state.sink.subscribe();
    let mut delivered = Delivered::default();

    info!("WebSocket client connected");

    // Send current entity list on connect
    for entity in state.sink.entities() {
        delivered.first(&entity);
        if let Some(msg) = encode(&WsMessage::EntityRegistered(entity)) {
            if sender.send(msg).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(entity) if !delivered.first(&entity) => {
                        debug!(device = %entity.info.device_id, "Entity already sent");
                    }
                    Ok(entity) => {
                        if let Some(msg) = encode(&WsMessage::EntityRegistered(entity)) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Entity event channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            if let Some(pong) = encode(&WsMessage::Pong) {
                                if sender.send(pong).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
