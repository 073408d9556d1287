//! UseCase: ピア登録解除処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - UnregisterPeerUseCase::execute() メソッド
//! - 切断したピアとリンクしていたピアへの closed 通知
//!
//! ### なぜこのテストが必要か
//! - ホストが落ちたことをクライアントが知る唯一の経路（再接続のトリガー）
//! - リンクしていないピアには通知しないことを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：リンク中のピアへの通知
//! - 異常系：存在しないピアの登録解除

use std::sync::Arc;

use crate::domain::{MessagePusher, Notice, PeerId, PeerRepository};

use super::error::UnregisterError;

/// ピア登録解除のユースケース
pub struct UnregisterPeerUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn PeerRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl UnregisterPeerUseCase {
    /// 新しい UnregisterPeerUseCase を作成
    pub fn new(repository: Arc<dyn PeerRepository>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// ピア登録解除を実行
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<PeerId>)` - closed を通知したピアの ID リスト
    /// * `Err(UnregisterError)` - ピアが登録されていない
    pub async fn execute(&self, peer_id: &PeerId) -> Result<Vec<PeerId>, UnregisterError> {
        // 1. Repository からピアを削除（リンク先を取得）
        let linked = self
            .repository
            .unregister(peer_id)
            .await
            .map_err(|_| UnregisterError::PeerNotFound(peer_id.as_str().to_string()))?;

        // 2. MessagePusher からチャンネルを登録解除
        self.message_pusher.unregister_client(peer_id).await;

        // 3. リンクしていたピアに closed を通知（一部の送信失敗は許容）
        let notice = Notice::Closed {
            src: peer_id.clone(),
        };
        for target in &linked {
            if let Err(e) = self.message_pusher.push_to(target, &notice).await {
                tracing::warn!("Failed to notify '{}' that '{}' left: {}", target, peer_id, e);
            }
        }

        Ok(linked)
    }
}
