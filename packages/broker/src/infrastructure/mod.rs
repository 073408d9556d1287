//! Infrastructure layer of the relay broker.
//!
//! - `dto`: wire frames and HTTP response bodies
//! - `repository`: PeerRepository implementations
//! - `message_pusher`: MessagePusher implementations

pub mod dto;
pub mod message_pusher;
pub mod repository;
