//! Data Transfer Objects (DTOs) for the relay broker.
//!
//! DTOs are organized by protocol:
//! - `websocket`: frames exchanged over the peer WebSocket
//! - `http`: HTTP API response DTOs

pub mod conversion;
pub mod http;
pub mod websocket;
