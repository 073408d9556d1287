//! Entities of the broker domain.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::{
    error::DirectoryError,
    value_object::{PeerId, Timestamp},
};

/// A peer currently registered with the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredPeer {
    pub id: PeerId,
    pub registered_at: Timestamp,
    /// Peers this one has an open link with (links are symmetric)
    pub links: BTreeSet<PeerId>,
}

impl RegisteredPeer {
    pub fn new(id: PeerId, registered_at: Timestamp) -> Self {
        Self {
            id,
            registered_at,
            links: BTreeSet::new(),
        }
    }
}

/// Directory of registered peers and the links between them.
///
/// ## Invariants
///
/// - A peer id is registered at most once.
/// - Links are symmetric: `a` links `b` iff `b` links `a`.
/// - Unregistering a peer drops every link that touched it.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, RegisteredPeer>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, peer: RegisteredPeer) -> Result<(), DirectoryError> {
        if self.peers.contains_key(&peer.id) {
            return Err(DirectoryError::AlreadyRegistered(
                peer.id.as_str().to_string(),
            ));
        }
        self.peers.insert(peer.id.clone(), peer);
        Ok(())
    }

    /// Remove a peer and return it with the links it had at removal time.
    pub fn unregister(&mut self, id: &PeerId) -> Option<RegisteredPeer> {
        let removed = self.peers.remove(id)?;
        for linked in &removed.links {
            if let Some(other) = self.peers.get_mut(linked) {
                other.links.remove(id);
            }
        }
        Some(removed)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn link(&mut self, a: &PeerId, b: &PeerId) -> Result<(), DirectoryError> {
        for id in [a, b] {
            if !self.peers.contains_key(id) {
                return Err(DirectoryError::NotRegistered(id.as_str().to_string()));
            }
        }
        if let Some(peer) = self.peers.get_mut(a) {
            peer.links.insert(b.clone());
        }
        if let Some(peer) = self.peers.get_mut(b) {
            peer.links.insert(a.clone());
        }
        Ok(())
    }

    /// Drop the link between `a` and `b`. Returns whether a link existed.
    pub fn unlink(&mut self, a: &PeerId, b: &PeerId) -> bool {
        let removed = self
            .peers
            .get_mut(a)
            .map(|peer| peer.links.remove(b))
            .unwrap_or(false);
        if let Some(peer) = self.peers.get_mut(b) {
            peer.links.remove(a);
        }
        removed
    }

    pub fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.peers
            .get(a)
            .map(|peer| peer.links.contains(b))
            .unwrap_or(false)
    }

    /// Registered peers sorted by id
    pub fn peers(&self) -> Vec<RegisteredPeer> {
        let mut peers: Vec<RegisteredPeer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_id(value: &str) -> PeerId {
        PeerId::new(value.to_string()).unwrap()
    }

    fn directory_with(ids: &[&str]) -> PeerDirectory {
        let mut directory = PeerDirectory::new();
        for id in ids {
            directory
                .register(RegisteredPeer::new(peer_id(id), Timestamp::new(1000)))
                .unwrap();
        }
        directory
    }

    #[test]
    fn test_register_duplicate_is_rejected() {
        // テスト項目: 同じ ID の二重登録はエラーになる
        // given (前提条件):
        let mut directory = directory_with(&["host"]);

        // when (操作):
        let result = directory.register(RegisteredPeer::new(peer_id("host"), Timestamp::new(2000)));

        // then (期待する結果):
        assert_eq!(
            result,
            Err(DirectoryError::AlreadyRegistered("host".to_string()))
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_link_is_symmetric() {
        // テスト項目: リンクは双方向に張られる
        // given (前提条件):
        let mut directory = directory_with(&["host", "alice"]);

        // when (操作):
        directory.link(&peer_id("alice"), &peer_id("host")).unwrap();

        // then (期待する結果):
        assert!(directory.is_linked(&peer_id("alice"), &peer_id("host")));
        assert!(directory.is_linked(&peer_id("host"), &peer_id("alice")));
    }

    #[test]
    fn test_link_to_unknown_peer_fails() {
        // テスト項目: 未登録のピアへのリンクはエラーになる
        // given (前提条件):
        let mut directory = directory_with(&["alice"]);

        // when (操作):
        let result = directory.link(&peer_id("alice"), &peer_id("host"));

        // then (期待する結果):
        assert_eq!(result, Err(DirectoryError::NotRegistered("host".to_string())));
        assert!(directory.peers()[0].links.is_empty());
    }

    #[test]
    fn test_unregister_drops_links_on_both_sides() {
        // テスト項目: 登録解除でそのピアに関するリンクが全て消える
        // given (前提条件):
        let mut directory = directory_with(&["host", "alice", "bob"]);
        directory.link(&peer_id("alice"), &peer_id("host")).unwrap();
        directory.link(&peer_id("bob"), &peer_id("host")).unwrap();

        // when (操作):
        let removed = directory.unregister(&peer_id("host")).unwrap();

        // then (期待する結果):
        assert_eq!(removed.links.len(), 2);
        assert!(!directory.is_linked(&peer_id("alice"), &peer_id("host")));
        assert!(!directory.is_linked(&peer_id("bob"), &peer_id("host")));
        assert!(!directory.contains(&peer_id("host")));
    }

    #[test]
    fn test_unlink_reports_whether_link_existed() {
        // テスト項目: unlink はリンクが存在した場合のみ true を返す
        // given (前提条件):
        let mut directory = directory_with(&["host", "alice"]);
        directory.link(&peer_id("alice"), &peer_id("host")).unwrap();

        // when (操作):
        let first = directory.unlink(&peer_id("host"), &peer_id("alice"));
        let second = directory.unlink(&peer_id("host"), &peer_id("alice"));

        // then (期待する結果):
        assert!(first);
        assert!(!second);
    }
}
