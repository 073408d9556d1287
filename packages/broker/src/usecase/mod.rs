//! UseCase 層
//!
//! ドメイン層の trait（PeerRepository, MessagePusher）にのみ依存し、
//! ブローカーのビジネスロジックを実装します。

mod error;
mod list_peers;
mod register_peer;
mod relay_signal;
mod unregister_peer;

pub use error::{ConnectError, RelayError, UnregisterError};
pub use list_peers::ListPeersUseCase;
pub use register_peer::RegisterPeerUseCase;
pub use relay_signal::RelaySignalUseCase;
pub use unregister_peer::UnregisterPeerUseCase;
