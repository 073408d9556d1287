//! UseCase: 登録中ピア一覧の取得

use std::sync::Arc;

use crate::domain::{PeerRepository, RegisteredPeer};

/// ピア一覧取得のユースケース
pub struct ListPeersUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn PeerRepository>,
}

impl ListPeersUseCase {
    /// 新しい ListPeersUseCase を作成
    pub fn new(repository: Arc<dyn PeerRepository>) -> Self {
        Self { repository }
    }

    /// 登録中の全てのピアを ID 順で返す
    pub async fn execute(&self) -> Vec<RegisteredPeer> {
        self.repository.list().await
    }
}
