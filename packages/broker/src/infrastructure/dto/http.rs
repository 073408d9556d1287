//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

/// `GET /api/peers` の要素
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummaryDto {
    pub id: String,
    /// RFC 3339 (UTC)
    pub registered_at: String,
    pub links: Vec<String>,
}

/// `GET /api/health` のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub peers: usize,
}
