//! WebSocket を使った MessagePusher 実装
//!
//! WebSocket 接続の受付と sender の生成は UI 層が行い、
//! この実装は受け取った sender を管理して通知をフレームとして送信します。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{MessagePushError, MessagePusher, Notice, PeerId, PusherChannel};
use crate::infrastructure::dto::websocket::BrokerFrame;

/// WebSocket を使った MessagePusher 実装
pub struct WebSocketMessagePusher {
    /// 接続中のピアの WebSocket sender
    clients: Arc<Mutex<HashMap<PeerId, PusherChannel>>>,
}

impl WebSocketMessagePusher {
    /// 新しい WebSocketMessagePusher を作成
    pub fn new(clients: Arc<Mutex<HashMap<PeerId, PusherChannel>>>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, peer_id: PeerId, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        tracing::debug!("Peer '{}' registered to MessagePusher", peer_id);
        clients.insert(peer_id, sender);
    }

    async fn unregister_client(&self, peer_id: &PeerId) {
        let mut clients = self.clients.lock().await;
        clients.remove(peer_id);
        tracing::debug!("Peer '{}' unregistered from MessagePusher", peer_id);
    }

    async fn push_to(&self, peer_id: &PeerId, notice: &Notice) -> Result<(), MessagePushError> {
        let frame = BrokerFrame::from(notice.clone());
        let json = serde_json::to_string(&frame)
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;

        let clients = self.clients.lock().await;
        let sender = clients
            .get(peer_id)
            .ok_or_else(|| MessagePushError::ClientNotFound(peer_id.as_str().to_string()))?;
        sender
            .send(json)
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
        tracing::trace!("Pushed frame to peer '{}'", peer_id);
        Ok(())
    }
}
