//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a game WebSocket connection.
//! Incoming messages are handed to the connection's `GameConnection`; everything the
//! server sends goes through one channel drained by a writer task.

use crate::web::{
    game_task::{GameConnection, Outbound, OUTBOUND_CAPACITY},
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, SessionState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "Switching to the game WebSocket protocol"),
        (status = 401, description = "Missing or expired session cookie")
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New WebSocket connection established for user: {}", user_id);

    let (sender, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(write_frames(sender, outbound_rx));

    // --- 1. Initialization Phase ---
    let session = match SessionState::new(&app_state, user_id).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to initialize session state: {:?}", e);
            let _ = outbound_tx
                .send(Outbound::Message(ServerMessage::Error {
                    message: "Failed to load your account data.".to_string(),
                }))
                .await;
            drop(outbound_tx);
            let _ = writer.await;
            return;
        }
    };
    let connection = GameConnection::new(app_state, session, outbound_tx);

    // --- 2. Main Message Loop ---
    loop {
        if let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match decode(&text) {
                    Ok(client_msg) => connection.handle(client_msg).await,
                    Err(reply) => connection.send(reply).await,
                },
                Message::Close(_) => {
                    info!("Client sent close message.");
                    break;
                }
                _ => {}
            }
        } else {
            info!("Client disconnected.");
            break;
        }
    }

    // --- 3. Cleanup ---
    connection.shutdown().await;
    drop(connection);
    writer.abort();
    info!("WebSocket connection closed for user: {}", user_id);
}

/// Parses a client message, or builds the error the client is told about.
fn decode(text: &str) -> Result<ClientMessage, ServerMessage> {
    serde_json::from_str(text).map_err(|e| {
        warn!("Failed to deserialize client message: {}", e);
        ServerMessage::Error {
            message: format!("Could not understand the message: {}", e),
        }
    })
}

/// Forwards queued frames to the socket until the channel closes or a send fails.
async fn write_frames(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        let message = match frame {
            Outbound::Message(message) => match serde_json::to_string(&message) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            },
            Outbound::Audio(audio) => Message::Binary(audio.into()),
        };
        if sender.send(message).await.is_err() {
            error!("Failed to send a frame to the client. Ending writer task.");
            break;
        }
    }
}
