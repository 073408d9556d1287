//! Connection Manager: the star topology over a peer transport.
//!
//! A host registers the deterministic host identity of its room and accepts
//! links from clients. A client registers a random identity and keeps exactly
//! one link, to the host. Lost identities and lost host links are retried with
//! exponential backoff until the retry budget runs out.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    config::{SyncConfig, millis},
    error::TransportError,
    protocol::Command,
    session::{Role, RoomId},
    transport::{EventSink, PeerId, PeerTransport, TransportEvent, TransportFactory},
};

/// Lifecycle of one logical link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Host-side registry entry. Entries are never removed while in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub peer_id: PeerId,
    pub active: bool,
    pub last_seen_at: i64,
}

/// Advisory indicator derived from heartbeat replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
    Live,
    #[default]
    Idle,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Idle => f.write_str("idle"),
        }
    }
}

/// Retry budget exhausted; nothing is retried until the user starts over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    ConnectionLost,
    TooManyAttempts,
}

impl Terminal {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ConnectionLost => "Connection lost. Please refresh.",
            Self::TooManyAttempts => "Too many attempts. Refresh to try again.",
        }
    }
}

/// Payload received on an open link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub from: PeerId,
    pub payload: String,
}

pub struct ConnectionManager {
    config: SyncConfig,
    factory: Arc<dyn TransportFactory>,
    /// Carries the generation of the live transport
    sink: EventSink,
    transport: Option<Box<dyn PeerTransport>>,
    context: Option<(Role, RoomId)>,
    connections: BTreeMap<PeerId, ConnectionState>,
    registry: BTreeMap<PeerId, Peer>,
    identity_open: bool,
    reconnect_attempts: u32,
    init_attempts: u32,
    reconnect_at: Option<i64>,
    terminal: Option<Terminal>,
    last_pong_at: Option<i64>,
    heartbeat_at: Option<i64>,
    health_at: Option<i64>,
}

impl ConnectionManager {
    pub fn new(config: SyncConfig, factory: Arc<dyn TransportFactory>, sink: EventSink) -> Self {
        Self {
            config,
            factory,
            sink,
            transport: None,
            context: None,
            connections: BTreeMap::new(),
            registry: BTreeMap::new(),
            identity_open: false,
            reconnect_attempts: 0,
            init_attempts: 0,
            reconnect_at: None,
            terminal: None,
            last_pong_at: None,
            heartbeat_at: None,
            health_at: None,
        }
    }

    /// Generation of the live (or most recent) transport
    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    pub fn role(&self) -> Option<Role> {
        self.context.as_ref().map(|(role, _)| *role)
    }

    pub fn local_id(&self) -> Option<&PeerId> {
        self.transport.as_ref().map(|transport| transport.local_id())
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.terminal
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_at.is_some()
    }

    pub fn is_identity_open(&self) -> bool {
        self.identity_open
    }

    /// Register the local identity for `role` in `room_id`.
    ///
    /// Does nothing while a transport is live; tear it down first.
    pub fn initialize(&mut self, role: Role, room_id: RoomId, now: i64) {
        if self.transport.is_some() {
            tracing::warn!("Transport already initialized, ignoring initialize");
            return;
        }
        self.context = Some((role, room_id));
        self.open_identity(now);
    }

    /// Start over under a new role: drop every link and the registry
    pub fn reinitialize(&mut self, role: Role, room_id: RoomId, now: i64) {
        self.shutdown();
        self.initialize(role, room_id, now);
    }

    /// Leave-room teardown. Clears every counter and the registry.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.context = None;
        self.registry.clear();
        self.reconnect_attempts = 0;
        self.init_attempts = 0;
        self.terminal = None;
        self.last_pong_at = None;
    }

    fn open_identity(&mut self, now: i64) {
        let Some((role, room_id)) = self.context.clone() else {
            return;
        };

        self.init_attempts += 1;
        if self.init_attempts > self.config.max_init_attempts {
            tracing::error!(
                "Giving up after {} transport initialization attempts",
                self.config.max_init_attempts
            );
            self.terminal = Some(Terminal::TooManyAttempts);
            return;
        }

        self.sink = self.sink.with_generation(self.sink.generation() + 1);
        let local_id = match role {
            Role::Host => room_id.host_peer_id(),
            Role::Client => PeerId::random_client(),
        };
        tracing::info!(
            "Opening transport identity '{}' as {} (generation {})",
            local_id,
            role,
            self.sink.generation()
        );
        self.transport = Some(self.factory.open(local_id, self.sink.clone()));
        self.heartbeat_at = Some(now + millis(self.config.heartbeat_interval));
    }

    /// Stop timers, say goodbye on every open link, then destroy the identity.
    ///
    /// Events still in flight for the old transport become stale.
    fn teardown(&mut self) {
        self.reconnect_at = None;
        self.heartbeat_at = None;
        self.health_at = None;

        if let Some(mut transport) = self.transport.take() {
            if let Ok(leave) = Command::Leave.encode() {
                for peer in self.open_peers() {
                    if let Err(e) = transport.send(&peer, &leave) {
                        tracing::debug!("Could not send leave to '{}': {}", peer, e);
                    }
                }
            }
            let peers: Vec<PeerId> = self.connections.keys().cloned().collect();
            for peer in &peers {
                transport.close(peer);
            }
            transport.destroy();
            tracing::debug!("Transport '{}' torn down", transport.local_id());
        }

        self.sink = self.sink.with_generation(self.sink.generation() + 1);
        self.connections.clear();
        self.identity_open = false;
        for peer in self.registry.values_mut() {
            peer.active = false;
        }
    }

    /// Apply a transport event. Returns payloads that need protocol handling.
    pub fn on_transport(
        &mut self,
        generation: u64,
        event: TransportEvent,
        now: i64,
    ) -> Option<Inbound> {
        if generation != self.generation() || self.transport.is_none() {
            tracing::debug!(
                "Ignoring stale transport event from generation {}: {:?}",
                generation,
                event
            );
            return None;
        }
        let role = self.role()?;

        match event {
            TransportEvent::IdentityOpen => self.on_identity_open(role, now),
            TransportEvent::IdentityDisconnected => {
                tracing::warn!("Transport identity disconnected");
                self.identity_open = false;
                self.schedule_reconnect(now);
            }
            TransportEvent::IdentityError(e) => {
                tracing::warn!("Transport identity error: {}", e);
                self.identity_open = false;
                self.schedule_reconnect(now);
            }
            TransportEvent::IncomingConnection(peer) => self.on_incoming(role, peer, now),
            TransportEvent::ConnectionOpen(peer) => self.on_connection_open(role, peer),
            TransportEvent::Data(peer, payload) => {
                if let Some(entry) = self.registry.get_mut(&peer) {
                    entry.last_seen_at = now;
                }
                return Some(Inbound {
                    from: peer,
                    payload,
                });
            }
            TransportEvent::ConnectionClosed(peer) => {
                tracing::info!("Connection to '{}' closed", peer);
                self.on_connection_lost(role, peer, ConnectionState::Closed, now);
            }
            TransportEvent::ConnectionError(peer, e) => {
                tracing::warn!("Connection to '{}' failed: {}", peer, e);
                self.on_connection_lost(role, peer, ConnectionState::Errored, now);
            }
        }
        None
    }

    fn on_identity_open(&mut self, role: Role, now: i64) {
        self.identity_open = true;
        self.init_attempts = 0;
        self.health_at = Some(now + millis(self.config.health_check_interval));
        tracing::info!(
            "Transport identity '{}' is open",
            self.local_id().map(PeerId::as_str).unwrap_or_default()
        );

        match role {
            Role::Host => self.reconnect_attempts = 0,
            Role::Client => {
                let Some(host) = self.host_id() else {
                    return;
                };
                self.connections
                    .insert(host.clone(), ConnectionState::Connecting);
                let result = match self.transport.as_mut() {
                    Some(transport) => transport.connect(&host),
                    None => Err(TransportError::Closed),
                };
                if let Err(e) = result {
                    tracing::warn!("Could not connect to host '{}': {}", host, e);
                    self.connections.insert(host, ConnectionState::Errored);
                    self.schedule_reconnect(now);
                }
            }
        }
    }

    fn on_incoming(&mut self, role: Role, peer: PeerId, now: i64) {
        if !role.is_host() {
            tracing::warn!("Client refused inbound connection from '{}'", peer);
            if let Some(transport) = self.transport.as_mut() {
                transport.close(&peer);
            }
            return;
        }
        tracing::info!("Peer '{}' connected", peer);
        self.connections.insert(peer.clone(), ConnectionState::Open);
        self.registry.insert(
            peer.clone(),
            Peer {
                peer_id: peer,
                active: true,
                last_seen_at: now,
            },
        );
    }

    fn on_connection_open(&mut self, role: Role, peer: PeerId) {
        self.connections.insert(peer.clone(), ConnectionState::Open);
        self.reconnect_attempts = 0;
        tracing::info!("Connection to '{}' is open", peer);

        if role == Role::Client && self.host_id().as_ref() == Some(&peer) {
            for command in [Command::SyncRequest, Command::RoomUrlRequest] {
                if let Err(e) = self.send_command(&peer, &command) {
                    tracing::warn!("Could not send {} to host: {}", command.kind(), e);
                }
            }
        }
    }

    fn on_connection_lost(&mut self, role: Role, peer: PeerId, state: ConnectionState, now: i64) {
        match role {
            Role::Host => {
                self.connections.remove(&peer);
                if let Some(entry) = self.registry.get_mut(&peer) {
                    entry.active = false;
                }
            }
            Role::Client => {
                if self.host_id().as_ref() != Some(&peer) {
                    return;
                }
                self.connections.insert(peer, state);
                self.schedule_reconnect(now);
            }
        }
    }

    /// A peer announced it is leaving
    pub fn mark_departed(&mut self, peer: &PeerId) {
        if let Some(entry) = self.registry.get_mut(peer) {
            entry.active = false;
            tracing::info!("Peer '{}' left", peer);
        }
    }

    /// Count the next reconnect attempt and arm its timer.
    ///
    /// A pending reconnect absorbs further triggers.
    pub fn schedule_reconnect(&mut self, now: i64) {
        if self.terminal.is_some() || self.reconnect_at.is_some() || self.context.is_none() {
            return;
        }
        self.reconnect_attempts += 1;
        if self.reconnect_attempts > self.config.max_reconnect_attempts {
            tracing::error!(
                "Giving up after {} reconnect attempts",
                self.config.max_reconnect_attempts
            );
            self.terminal = Some(Terminal::ConnectionLost);
            return;
        }
        let delay = self.config.backoff_delay(self.reconnect_attempts);
        tracing::info!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            self.reconnect_attempts
        );
        self.reconnect_at = Some(now + millis(delay));
    }

    /// Scheduled reconnect delay in milliseconds, if one is pending
    pub fn pending_reconnect_delay(&self, now: i64) -> Option<i64> {
        self.reconnect_at.map(|at| at - now)
    }

    /// Run whichever timers are due
    pub fn on_tick(&mut self, now: i64) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            tracing::info!("Reconnecting (attempt {})", self.reconnect_attempts);
            self.teardown();
            self.open_identity(now);
        }

        if self.health_at.is_some_and(|at| at <= now) {
            self.health_at = Some(now + millis(self.config.health_check_interval));
            let disconnected = self
                .transport
                .as_ref()
                .is_none_or(|transport| transport.is_disconnected());
            if disconnected && self.reconnect_at.is_none() {
                tracing::warn!("Health check found the transport identity disconnected");
                self.schedule_reconnect(now);
            }
        }

        if self.heartbeat_at.is_some_and(|at| at <= now) {
            self.heartbeat_at = Some(now + millis(self.config.heartbeat_interval));
            self.broadcast(&Command::Ping { timestamp: now }, None);
        }
    }

    pub fn next_deadline(&self) -> Option<i64> {
        [self.reconnect_at, self.health_at, self.heartbeat_at]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn record_pong(&mut self, now: i64) {
        self.last_pong_at = Some(now);
    }

    pub fn liveness(&self, now: i64) -> Liveness {
        match self.last_pong_at {
            Some(at) if now - at <= millis(self.config.liveness_timeout) => Liveness::Live,
            _ => Liveness::Idle,
        }
    }

    pub fn host_id(&self) -> Option<PeerId> {
        self.context
            .as_ref()
            .map(|(_, room_id)| room_id.host_peer_id())
    }

    pub fn connection_state(&self, peer: &PeerId) -> Option<ConnectionState> {
        self.connections.get(peer).copied()
    }

    pub fn open_peers(&self) -> Vec<PeerId> {
        self.connections
            .iter()
            .filter(|(_, state)| **state == ConnectionState::Open)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    pub fn registry(&self) -> Vec<Peer> {
        self.registry.values().cloned().collect()
    }

    /// `1 + active peers` on a host, `1 + open host link` on a client
    pub fn participant_count(&self) -> usize {
        match self.role() {
            None => 0,
            Some(Role::Host) => 1 + self.registry.values().filter(|peer| peer.active).count(),
            Some(Role::Client) => {
                let host_open = self
                    .host_id()
                    .and_then(|host| self.connection_state(&host))
                    == Some(ConnectionState::Open);
                1 + usize::from(host_open)
            }
        }
    }

    pub fn send_payload(&mut self, peer: &PeerId, payload: &str) -> Result<(), TransportError> {
        if self.connection_state(peer) != Some(ConnectionState::Open) {
            return Err(TransportError::NotConnected(peer.to_string()));
        }
        self.transport
            .as_mut()
            .ok_or(TransportError::Closed)?
            .send(peer, payload)
    }

    pub fn send_command(&mut self, peer: &PeerId, command: &Command) -> Result<(), TransportError> {
        let payload = command
            .encode()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        self.send_payload(peer, &payload)
    }

    /// Client only: send to the host link
    pub fn send_to_host(&mut self, command: &Command) -> Result<(), TransportError> {
        let host = self.host_id().ok_or(TransportError::Closed)?;
        self.send_command(&host, command)
    }

    /// Send to every open link except `except`. Returns how many sends succeeded.
    pub fn broadcast(&mut self, command: &Command, except: Option<&PeerId>) -> usize {
        match command.encode() {
            Ok(payload) => self.broadcast_payload(&payload, except),
            Err(e) => {
                tracing::warn!("Dropping {} broadcast: {}", command.kind(), e);
                0
            }
        }
    }

    /// Forward an already encoded payload verbatim
    pub fn broadcast_payload(&mut self, payload: &str, except: Option<&PeerId>) -> usize {
        let mut sent = 0;
        for peer in self.open_peers() {
            if except == Some(&peer) {
                continue;
            }
            match self.send_payload(&peer, payload) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!("Send to '{}' failed: {}", peer, e),
            }
        }
        sent
    }

    /// Host only: remove `peer` from the room.
    ///
    /// `pause` is the pause event the peer receives before the kick. Returns
    /// false when the peer is unknown.
    pub fn kick(&mut self, peer: &PeerId, pause: &Command) -> bool {
        let Some(entry) = self.registry.get_mut(peer) else {
            tracing::warn!("Cannot kick unknown peer '{}'", peer);
            return false;
        };
        entry.active = false;

        for command in [pause, &Command::kick(), &Command::Leave] {
            if let Err(e) = self.send_command(peer, command) {
                tracing::debug!("Could not send {} to '{}': {}", command.kind(), peer, e);
            }
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.close(peer);
        }
        self.connections.remove(peer);
        tracing::info!("Peer '{}' removed from the room", peer);
        true
    }
}
