//! UseCase: シグナル中継処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RelaySignalUseCase::execute() メソッド
//! - connect / data / close の各シグナルの中継
//!
//! ### なぜこのテストが必要か
//! - リンクが張られていない相手へのデータ送信を拒否する必要がある
//! - 存在しないピア（ホスト未起動のルーム）への接続は送信元にエラーで返す
//!
//! ### どのような状況を想定しているか
//! - 正常系：connect → data → close
//! - 異常系：未登録ピアへの connect、リンクなしの data

use std::sync::Arc;

use crate::domain::{FailureReason, MessagePusher, Notice, PeerId, PeerRepository, Signal};

use super::error::RelayError;

/// シグナル中継のユースケース
pub struct RelaySignalUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn PeerRepository>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl RelaySignalUseCase {
    /// 新しい RelaySignalUseCase を作成
    pub fn new(repository: Arc<dyn PeerRepository>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    /// シグナル中継を実行
    ///
    /// 拒否したシグナルは送信元に `Notice::Failed` として通知した上で
    /// エラーを返します。
    pub async fn execute(&self, src: &PeerId, signal: Signal) -> Result<(), RelayError> {
        match signal {
            Signal::Connect { dst } => self.connect(src, dst).await,
            Signal::Data { dst, payload } => self.forward(src, dst, payload).await,
            Signal::Close { dst } => self.close(src, dst).await,
        }
    }

    /// 解析できなかったフレームを送信元に通知
    pub async fn reject_malformed(&self, src: &PeerId) {
        self.fail(src, None, FailureReason::Malformed).await;
    }

    async fn connect(&self, src: &PeerId, dst: PeerId) -> Result<(), RelayError> {
        if &dst == src || !self.repository.contains(&dst).await {
            self.fail(src, Some(dst.clone()), FailureReason::PeerUnavailable)
                .await;
            return Err(RelayError::PeerUnavailable(dst.into_string()));
        }

        if self.repository.link(src, &dst).await.is_err() {
            self.fail(src, Some(dst.clone()), FailureReason::PeerUnavailable)
                .await;
            return Err(RelayError::PeerUnavailable(dst.into_string()));
        }

        // 相手に着信を通知してから、送信元に確立を通知する
        self.push(&dst, Notice::Incoming { src: src.clone() }).await?;
        self.push(src, Notice::Accepted { src: dst }).await
    }

    async fn forward(&self, src: &PeerId, dst: PeerId, payload: String) -> Result<(), RelayError> {
        if !self.repository.is_linked(src, &dst).await {
            self.fail(src, Some(dst.clone()), FailureReason::NotLinked)
                .await;
            return Err(RelayError::NotLinked(dst.into_string()));
        }
        self.push(
            &dst,
            Notice::Data {
                src: src.clone(),
                payload,
            },
        )
        .await
    }

    async fn close(&self, src: &PeerId, dst: PeerId) -> Result<(), RelayError> {
        if self.repository.unlink(src, &dst).await {
            self.push(&dst, Notice::Closed { src: src.clone() }).await?;
        }
        Ok(())
    }

    async fn push(&self, target: &PeerId, notice: Notice) -> Result<(), RelayError> {
        self.message_pusher
            .push_to(target, &notice)
            .await
            .map_err(|e| RelayError::PushFailed(e.to_string()))
    }

    async fn fail(&self, src: &PeerId, dst: Option<PeerId>, reason: FailureReason) {
        tracing::debug!("Rejecting signal from '{}': {}", src, reason.as_str());
        let notice = Notice::Failed { src: dst, reason };
        if let Err(e) = self.message_pusher.push_to(src, &notice).await {
            tracing::warn!("Failed to push failure notice to '{}': {}", src, e);
        }
    }
}
