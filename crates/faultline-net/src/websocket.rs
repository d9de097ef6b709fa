//! ---
//! fl_section: "06-networking"
//! fl_subsection: "module"
//! fl_type: "source"
//! fl_scope: "code"
//! fl_description: "WebSocket stream of registry snapshots."
//! fl_version: "v0.1.0"
//! fl_owner: "sre-platform"
//! ---
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, warn};

use crate::rest::ApiState;

pub(crate) async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(|socket| client_loop(socket, state))
}

/// Forward every snapshot queued for this client as a text frame.
///
/// The loop ends when the client goes away or the broadcaster drops the
/// subscription; the broadcaster notices the closed queue on its next push.
async fn client_loop(mut socket: WebSocket, state: Arc<ApiState>) {
    let mut subscription = match state.broadcaster.subscribe(&state.registry) {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(error = %err, "failed to register websocket subscriber");
            return;
        }
    };
    let id = subscription.id();
    debug!(subscriber = id, "websocket client connected");

    loop {
        tokio::select! {
            payload = subscription.recv() => {
                let Some(payload) = payload else {
                    debug!(subscriber = id, "subscription dropped by broadcaster");
                    break;
                };
                let text = match std::str::from_utf8(&payload) {
                    Ok(text) => text.to_owned(),
                    Err(err) => {
                        warn!(error = %err, "snapshot payload is not valid utf-8");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!(subscriber = id, "websocket client disconnected");
}
