//! Live change stream over websocket

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};

use crate::api::AppState;
use crate::hub::Hub;

/// GET /api/ws
pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.coordinator.hub().clone();
    ws.on_upgrade(move |socket| forward_changes(socket, hub))
}

/// Forward hub messages as JSON text until either side goes away
async fn forward_changes(mut socket: WebSocket, hub: Hub) {
    let mut subscription = hub.subscribe();
    let id = subscription.id;
    tracing::debug!("Websocket subscriber {} connected", id);

    loop {
        tokio::select! {
            change = subscription.recv() => {
                // None once the hub dropped a slow subscriber
                let Some(change) = change else { break };
                let text = match serde_json::to_string(&change) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Failed to encode change message: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(id);
    tracing::debug!("Websocket subscriber {} disconnected", id);
}
