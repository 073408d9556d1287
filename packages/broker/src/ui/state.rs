//! Server state shared by the handlers.

use std::sync::Arc;

use crate::usecase::{
    ListPeersUseCase, RegisterPeerUseCase, RelaySignalUseCase, UnregisterPeerUseCase,
};

/// Shared application state
pub struct AppState {
    /// RegisterPeerUseCase（ピア登録のユースケース）
    pub register_peer_usecase: Arc<RegisterPeerUseCase>,
    /// UnregisterPeerUseCase（ピア登録解除のユースケース）
    pub unregister_peer_usecase: Arc<UnregisterPeerUseCase>,
    /// RelaySignalUseCase（シグナル中継のユースケース）
    pub relay_signal_usecase: Arc<RelaySignalUseCase>,
    /// ListPeersUseCase（ピア一覧取得のユースケース）
    pub list_peers_usecase: Arc<ListPeersUseCase>,
}
