//! WebSocket key event channel
//!
//! Each text (or binary) frame carries one JSON key event:
//! `{"type":"down"|"up","code":"KeyA","ctrl":bool,"shift":bool,"alt":bool,"meta":bool}`.
//!
//! Nothing is ever sent back except pongs; bad frames are dropped by the
//! dispatcher. Keys still held when a client goes away are released.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::AppState;
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// WebSocket key event upgrade handler
pub async fn ws_hid_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_hid_socket(socket, state))
}

/// Handle a key event WebSocket connection
async fn handle_hid_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let log_throttler = LogThrottler::with_secs(5);

    info!("WebSocket keyboard client connected");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                let _ = sender.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket keyboard client closed the connection");
                break;
            }
            Ok(msg) => {
                let Some(frame) = frame_payload(msg) else {
                    continue;
                };
                if let Err(e) = state.hid.submit(frame).await {
                    warn_throttled!(log_throttler, "submit_failed", "Key event dropped: {}", e);
                }
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }

    // Release anything this client left held
    if let Err(e) = state.hid.reset().await {
        warn!("Failed to reset HID on WebSocket disconnect: {}", e);
    }

    info!("WebSocket keyboard connection ended");
}

/// Extract the key event payload from a data frame
fn frame_payload(msg: Message) -> Option<Vec<u8>> {
    match msg {
        Message::Text(text) => Some(text.into_bytes()),
        Message::Binary(data) => Some(data),
        _ => None,
    }
}
