//! InMemory Peer Repository 実装
//!
//! ドメイン層が定義する PeerRepository trait の具体的な実装。
//! PeerDirectory エンティティをそのままインメモリ DB として使用します。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    PeerDirectory, PeerId, PeerRepository, RegisteredPeer, RepositoryError, Timestamp,
};

/// インメモリ Peer Repository 実装
pub struct InMemoryPeerRepository {
    directory: Arc<Mutex<PeerDirectory>>,
}

impl InMemoryPeerRepository {
    /// 空のディレクトリで作成
    pub fn new() -> Self {
        Self {
            directory: Arc::new(Mutex::new(PeerDirectory::new())),
        }
    }
}

impl Default for InMemoryPeerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerRepository for InMemoryPeerRepository {
    async fn register(
        &self,
        peer_id: PeerId,
        registered_at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut directory = self.directory.lock().await;
        directory.register(RegisteredPeer::new(peer_id, registered_at))?;
        Ok(())
    }

    async fn unregister(&self, peer_id: &PeerId) -> Result<Vec<PeerId>, RepositoryError> {
        let mut directory = self.directory.lock().await;
        directory
            .unregister(peer_id)
            .map(|peer| peer.links.into_iter().collect())
            .ok_or_else(|| RepositoryError::PeerNotFound(peer_id.as_str().to_string()))
    }

    async fn contains(&self, peer_id: &PeerId) -> bool {
        self.directory.lock().await.contains(peer_id)
    }

    async fn link(&self, a: &PeerId, b: &PeerId) -> Result<(), RepositoryError> {
        let mut directory = self.directory.lock().await;
        directory.link(a, b)?;
        Ok(())
    }

    async fn unlink(&self, a: &PeerId, b: &PeerId) -> bool {
        self.directory.lock().await.unlink(a, b)
    }

    async fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.directory.lock().await.is_linked(a, b)
    }

    async fn list(&self) -> Vec<RegisteredPeer> {
        self.directory.lock().await.peers()
    }
}
