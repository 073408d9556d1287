//! UseCase: ピア登録処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RegisterPeerUseCase::execute() メソッド
//! - ピアの登録処理（重複チェック、送信チャンネル登録、open 通知）
//!
//! ### なぜこのテストが必要か
//! - 同じルームのホストが二重に起動された場合に後発を拒否する必要がある
//! - 登録直後に open 通知が届くことをクライアントが前提にしている
//!
//! ### どのような状況を想定しているか
//! - 正常系：新規ピアの登録
//! - 異常系：重複したピア ID での登録試行

use std::sync::Arc;

use curryparty_shared::time::get_unix_timestamp_millis;

use crate::domain::{MessagePusher, Notice, PeerId, PeerRepository, PusherChannel, Timestamp};

use super::error::ConnectError;

/// ピア登録のユースケース
pub struct RegisterPeerUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn PeerRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl RegisterPeerUseCase {
    /// 新しい RegisterPeerUseCase を作成
    pub fn new(repository: Arc<dyn PeerRepository>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// ピア登録を実行
    ///
    /// # Returns
    ///
    /// * `Ok(Timestamp)` - 登録成功（登録時刻を返す）
    /// * `Err(ConnectError)` - 登録失敗
    pub async fn execute(
        &self,
        peer_id: PeerId,
        sender: PusherChannel,
    ) -> Result<Timestamp, ConnectError> {
        // 1. 重複チェック
        if self.repository.contains(&peer_id).await {
            return Err(ConnectError::DuplicatePeerId(peer_id.into_string()));
        }

        // 2. Repository にピアを追加
        let registered_at = Timestamp::new(get_unix_timestamp_millis());
        self.repository
            .register(peer_id.clone(), registered_at)
            .await
            .map_err(|_| ConnectError::DuplicatePeerId(peer_id.as_str().to_string()))?;

        // 3. MessagePusher に送信チャンネルを登録し、open を通知
        self.message_pusher
            .register_client(peer_id.clone(), sender)
            .await;
        if let Err(e) = self
            .message_pusher
            .push_to(&peer_id, &Notice::Opened { id: peer_id.clone() })
            .await
        {
            tracing::warn!("Failed to push open notice to '{}': {}", peer_id, e);
        }

        Ok(registered_at)
    }
}
