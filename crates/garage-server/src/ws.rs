//! WebSocket push of door status.
//!
//! A client first receives the status of every door, then one message per
//! status change. The text frame `ping` is answered with `pong`. Sessions
//! close when the controller shuts down.

use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use garage_controller::{DoorEvent, GarageController};
use garage_core::{DoorId, DoorStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Messages sent to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    InitialStatus {
        doors: BTreeMap<DoorId, DoorStatus>,
    },
    StatusUpdate {
        door_id: DoorId,
        status: DoorStatus,
    },
}

impl From<&DoorEvent> for PushMessage {
    fn from(event: &DoorEvent) -> Self {
        PushMessage::StatusUpdate {
            door_id: event.door_id,
            status: event.status,
        }
    }
}

/// `GET /ws`
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state.controller))
}

async fn session(socket: WebSocket, controller: GarageController) {
    // Subscribe before the snapshot so no change falls in between.
    let mut events = controller.subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!("websocket client connected");

    let initial = PushMessage::InitialStatus {
        doors: controller.get_all_status(),
    };
    if send(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str().trim() == "ping" => {
                    if sender.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%error, "websocket receive failed");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if send(&mut sender, &PushMessage::from(&event)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged, some events were dropped");
                }
                Err(RecvError::Closed) => break,
            },
            () = controller.stopped() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
    debug!("websocket client disconnected");
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &PushMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            warn!(%err, "failed to serialize websocket message");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
