// =============================================================================
// WebSocket Handler: order book push
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. The current order book view immediately on connect.
//   2. A fresh view every 500 ms whenever the state version has changed since
//      the last push.
//
// Ping frames are answered with Pong; Close or a receive error ends the
// connection.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::app_state::AppState;

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Manages a single WebSocket connection lifecycle.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut sequence: u64 = 0;

    if let Err(e) = send_view(&mut sender, &state, &mut sequence).await {
        warn!(error = %e, "Failed to send initial WebSocket view");
        return;
    }
    let mut last_sent_version = state.current_state_version();

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    match send_view(&mut sender, &state, &mut sequence).await {
                        Ok(()) => last_sent_version = current_version,
                        Err(e) => {
                            debug!(error = %e, "WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received, disconnecting");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!(messages = sequence, "WebSocket connection closed");
}

/// Serialize and send the current order book view.
async fn send_view<S>(sender: &mut S, state: &Arc<AppState>, sequence: &mut u64) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    *sequence += 1;
    let view = state.order_book_view();

    match serde_json::to_string(&view) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(version = view.state_version, seq = *sequence, "WebSocket view sent");
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; don't disconnect.
            warn!(error = %e, "Failed to serialize order book view");
            Ok(())
        }
    }
}
