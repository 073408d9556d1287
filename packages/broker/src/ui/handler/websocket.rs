//! WebSocket connection handler.
//!
//! A peer registers by upgrading `GET /peerjs?id=<peer id>`. Validation and
//! registration happen before the upgrade so failures surface as HTTP status
//! codes: 400 for a malformed id, 409 for an id that is already taken.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::{PeerId, Signal},
    infrastructure::dto::websocket::ClientFrame,
    ui::state::AppState,
    usecase::ConnectError,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub id: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let peer_id = match PeerId::try_from(query.id.clone()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Invalid peer id '{}': {}", query.id, e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    // Create a channel for frames pushed to this peer
    let (tx, rx) = mpsc::unbounded_channel();

    match state
        .register_peer_usecase
        .execute(peer_id.clone(), tx)
        .await
    {
        Ok(_registered_at) => {
            tracing::info!("Peer '{}' registered", peer_id);
            let failed_state = state.clone();
            let failed_id = peer_id.clone();
            Ok(ws
                .on_failed_upgrade(move |e| {
                    tracing::warn!("WebSocket upgrade for '{}' failed: {}", failed_id, e);
                    tokio::spawn(async move {
                        let _ = failed_state
                            .unregister_peer_usecase
                            .execute(&failed_id)
                            .await;
                    });
                })
                .on_upgrade(move |socket| handle_socket(socket, state, peer_id, rx)))
        }
        Err(ConnectError::DuplicatePeerId(id)) => {
            tracing::warn!("Peer id '{}' is already taken. Rejecting connection.", id);
            Err(StatusCode::CONFLICT)
        }
    }
}

/// Forwards frames queued for this peer to its WebSocket sink.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    peer_id: PeerId,
    rx: mpsc::UnboundedReceiver<String>,
) {
    let (sender, mut receiver) = socket.split();

    let recv_state = state.clone();
    let recv_id = peer_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error from '{}': {}", recv_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let signal = serde_json::from_str::<ClientFrame>(&text)
                        .ok()
                        .and_then(|frame| Signal::try_from(frame).ok());
                    match signal {
                        Some(signal) => {
                            if let Err(e) =
                                recv_state.relay_signal_usecase.execute(&recv_id, signal).await
                            {
                                tracing::debug!("Signal from '{}' rejected: {}", recv_id, e);
                            }
                        }
                        None => {
                            tracing::warn!("Malformed frame from '{}'", recv_id);
                            recv_state.relay_signal_usecase.reject_malformed(&recv_id).await;
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Peer '{}' requested close", recv_id);
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    match state.unregister_peer_usecase.execute(&peer_id).await {
        Ok(notified) => {
            tracing::info!(
                "Peer '{}' unregistered ({} linked peer(s) notified)",
                peer_id,
                notified.len()
            );
        }
        Err(e) => {
            tracing::warn!("Failed to unregister peer '{}': {}", peer_id, e);
        }
    }
}
