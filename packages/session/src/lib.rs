//! Peer session synchronization for CurryParty watch parties.
//!
//! One participant hosts a room, the others join it as clients. Clients link
//! only to the host, and the host relays playback events between them. Local
//! playback changes are debounced, echo-suppressed and sent as commands; remote
//! commands are applied through a [`adapter::VideoAdapter`]. Periodic
//! reconciliation corrects drift, and lost links are re-established with
//! exponential backoff.
//!
//! [`engine::SyncEngine`] holds the protocol state and is driven one input at
//! a time. [`actor::SessionHandle`] runs it on a dedicated tokio task.

pub mod actor;
pub mod adapter;
pub mod cli;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod notify;
pub mod page;
pub mod protocol;
pub mod reconcile;
pub mod relay;
pub mod session;
pub mod transport;
