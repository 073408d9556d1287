//! Error types of the broker domain.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("peer id must not be empty")]
    PeerIdEmpty,

    #[error("peer id is too long ({0} characters)")]
    PeerIdTooLong(usize),

    #[error("peer id contains invalid character '{0}'")]
    PeerIdInvalidCharacter(char),
}

/// Peer directory invariant violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("peer '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("peer '{0}' is not registered")]
    NotRegistered(String),
}

/// Repository errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("peer '{0}' is already registered")]
    PeerAlreadyRegistered(String),

    #[error("peer '{0}' not found")]
    PeerNotFound(String),
}

impl From<DirectoryError> for RepositoryError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::AlreadyRegistered(id) => Self::PeerAlreadyRegistered(id),
            DirectoryError::NotRegistered(id) => Self::PeerNotFound(id),
        }
    }
}

/// Message push errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("client '{0}' not found")]
    ClientNotFound(String),

    #[error("push failed: {0}")]
    PushFailed(String),
}
