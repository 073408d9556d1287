//! Domain layer of the relay broker.
//!
//! Value objects, the peer directory entity, notices pushed to peers, and the
//! traits the use cases depend on. Concrete implementations live in the
//! infrastructure layer.

pub mod entity;
pub mod error;
pub mod message_pusher;
pub mod notice;
pub mod repository;
pub mod value_object;

pub use entity::{PeerDirectory, RegisteredPeer};
pub use error::{DirectoryError, MessagePushError, RepositoryError, ValueObjectError};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use notice::{FailureReason, Notice, Signal};
pub use repository::PeerRepository;
pub use value_object::{PeerId, Timestamp};

#[cfg(test)]
pub use message_pusher::MockMessagePusher;
