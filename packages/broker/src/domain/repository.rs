//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{PeerId, RegisteredPeer, RepositoryError, Timestamp};

/// Peer Repository trait
///
/// UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装には依存しない。
#[async_trait]
pub trait PeerRepository: Send + Sync {
    /// ピアを登録
    async fn register(&self, peer_id: PeerId, registered_at: Timestamp)
    -> Result<(), RepositoryError>;

    /// ピアの登録を解除し、リンクしていたピアの ID を返す
    async fn unregister(&self, peer_id: &PeerId) -> Result<Vec<PeerId>, RepositoryError>;

    /// ピアが登録済みかどうか
    async fn contains(&self, peer_id: &PeerId) -> bool;

    /// 2 つのピア間にリンクを張る
    async fn link(&self, a: &PeerId, b: &PeerId) -> Result<(), RepositoryError>;

    /// リンクを削除（存在した場合 true）
    async fn unlink(&self, a: &PeerId, b: &PeerId) -> bool;

    /// 2 つのピアがリンクしているかどうか
    async fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool;

    /// 登録中の全てのピアを取得（ID 順）
    async fn list(&self) -> Vec<RegisteredPeer>;
}
