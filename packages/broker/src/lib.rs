//! Relay broker library.
//!
//! Peers register under a logical peer id over WebSocket, open links to each
//! other by id, and exchange opaque payloads over those links. The broker keeps
//! per-link order and tells each side when the other goes away.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
