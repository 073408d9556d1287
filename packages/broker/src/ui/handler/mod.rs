mod http;
mod websocket;

pub use http::{health_check, list_peers};
pub use websocket::websocket_handler;
