//! Peer Transport capability.
//!
//! A transport registers a local identity under a logical peer id and opens
//! reliable, ordered links to other identities. Calls never block: results and
//! remote activity arrive later as [`TransportEvent`]s through the
//! [`EventSink`] the transport was opened with.

mod memory;
mod websocket;

use std::{fmt, sync::Arc};

pub use memory::{MemoryNetwork, MemoryTransportFactory};
pub use websocket::WebSocketTransportFactory;

use crate::error::TransportError;

/// Logical transport identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh client identity, unique per session
    pub fn random_client() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("curryparty-peer-r{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something a transport reports about its identity or its links
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The local identity is registered and reachable
    IdentityOpen,
    /// The identity lost its registration; existing links may be gone too
    IdentityDisconnected,
    IdentityError(TransportError),
    /// A remote opened a link to us; the link is usable right away
    IncomingConnection(PeerId),
    /// A link we asked for is open
    ConnectionOpen(PeerId),
    Data(PeerId, String),
    ConnectionClosed(PeerId),
    ConnectionError(PeerId, TransportError),
}

type Deliver = Arc<dyn Fn(u64, TransportEvent) + Send + Sync>;

/// Where a transport reports its events.
///
/// Every event is tagged with the generation the transport was opened for,
/// so events from a torn-down transport can be told apart and ignored.
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    deliver: Deliver,
}

impl EventSink {
    pub fn new(
        generation: u64,
        deliver: impl Fn(u64, TransportEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            generation,
            deliver: Arc::new(deliver),
        }
    }

    /// Same destination, another generation
    pub fn with_generation(&self, generation: u64) -> Self {
        Self {
            generation,
            deliver: self.deliver.clone(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.deliver)(self.generation, event);
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// A live transport identity
pub trait PeerTransport: Send {
    fn local_id(&self) -> &PeerId;

    /// Start opening a link to `remote`
    fn connect(&mut self, remote: &PeerId) -> Result<(), TransportError>;

    /// Queue `payload` on the open link to `remote`
    fn send(&mut self, remote: &PeerId, payload: &str) -> Result<(), TransportError>;

    fn close(&mut self, remote: &PeerId);

    /// Drop the identity and every link. No events follow.
    fn destroy(&mut self);

    /// Whether the identity has lost its registration
    fn is_disconnected(&self) -> bool;
}

/// Opens transport identities
pub trait TransportFactory: Send + Sync {
    fn open(&self, local_id: PeerId, sink: EventSink) -> Box<dyn PeerTransport>;
}
