//! UseCase 層のエラー定義

use thiserror::Error;

/// ピア登録時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// 同じピア ID が既に登録されている（ホストの二重起動など）
    #[error("peer id '{0}' is already taken")]
    DuplicatePeerId(String),
}

/// ピア登録解除時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnregisterError {
    #[error("peer '{0}' is not registered")]
    PeerNotFound(String),
}

/// シグナル中継時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("peer '{0}' is unavailable")]
    PeerUnavailable(String),

    #[error("no link to peer '{0}'")]
    NotLinked(String),

    #[error("failed to push notice: {0}")]
    PushFailed(String),
}
