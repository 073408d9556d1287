//! MessagePusher trait 定義
//!
//! ピアへの通知（Notice）の送信を抽象化します。
//! WebSocket などの具体的な送信手段は Infrastructure 層が提供します。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{MessagePushError, Notice, PeerId};

/// ピアごとの送信チャンネル（シリアライズ済みのフレームを流す）
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// MessagePusher trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// ピアの送信チャンネルを登録
    async fn register_client(&self, peer_id: PeerId, sender: PusherChannel);

    /// ピアの送信チャンネルを登録解除
    async fn unregister_client(&self, peer_id: &PeerId);

    /// 特定のピアに通知を送信
    async fn push_to(&self, peer_id: &PeerId, notice: &Notice) -> Result<(), MessagePushError>;
}
