//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::http::{HealthDto, PeerSummaryDto},
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    let peers = state.list_peers_usecase.execute().await.len();
    Json(HealthDto {
        status: "ok".to_string(),
        peers,
    })
}

/// Get list of registered peers
pub async fn list_peers(State(state): State<Arc<AppState>>) -> Json<Vec<PeerSummaryDto>> {
    let peers = state.list_peers_usecase.execute().await;

    // Domain Model から DTO への変換
    Json(peers.into_iter().map(PeerSummaryDto::from).collect())
}
