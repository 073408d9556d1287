//! In-process transport hub.
//!
//! Every identity opened through a [`MemoryNetwork`] lives in one shared map.
//! Links are symmetric and deliver payloads in send order. The network also
//! lets a test cut links, knock identities offline and lose payloads.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::error::TransportError;

use super::{EventSink, PeerId, PeerTransport, TransportEvent, TransportFactory};

struct Endpoint {
    sink: EventSink,
    links: BTreeSet<PeerId>,
    disconnected: bool,
}

#[derive(Default)]
struct Hub {
    endpoints: HashMap<PeerId, Endpoint>,
    /// Payloads still to be lost, across all links
    drop_payloads: usize,
}

/// Shared in-memory network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> MemoryTransportFactory {
        MemoryTransportFactory {
            network: self.clone(),
        }
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.hub().endpoints.contains_key(id)
    }

    /// Identities `id` currently has a link with
    pub fn links_of(&self, id: &PeerId) -> Vec<PeerId> {
        self.hub()
            .endpoints
            .get(id)
            .map(|endpoint| endpoint.links.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Knock `id` off the network. Its links stay up.
    pub fn disconnect(&self, id: &PeerId) {
        let mut hub = self.hub();
        if let Some(endpoint) = hub.endpoints.get_mut(id) {
            endpoint.disconnected = true;
            endpoint.sink.emit(TransportEvent::IdentityDisconnected);
        }
    }

    /// Cut the link between `a` and `b`, telling both sides
    pub fn sever(&self, a: &PeerId, b: &PeerId) {
        let mut hub = self.hub();
        if unlink(&mut hub, a, b) {
            notify(&hub, a, TransportEvent::ConnectionClosed(b.clone()));
            notify(&hub, b, TransportEvent::ConnectionClosed(a.clone()));
        }
    }

    /// Silently lose the next `count` payloads sent on any link
    pub fn drop_next_payloads(&self, count: usize) {
        self.hub().drop_payloads = count;
    }
}

fn unlink(hub: &mut Hub, a: &PeerId, b: &PeerId) -> bool {
    let removed = hub
        .endpoints
        .get_mut(a)
        .map(|endpoint| endpoint.links.remove(b))
        .unwrap_or(false);
    if let Some(endpoint) = hub.endpoints.get_mut(b) {
        endpoint.links.remove(a);
    }
    removed
}

fn notify(hub: &Hub, target: &PeerId, event: TransportEvent) {
    if let Some(endpoint) = hub.endpoints.get(target) {
        endpoint.sink.emit(event);
    }
}

/// Opens identities on a [`MemoryNetwork`]
pub struct MemoryTransportFactory {
    network: MemoryNetwork,
}

impl TransportFactory for MemoryTransportFactory {
    fn open(&self, local_id: PeerId, sink: EventSink) -> Box<dyn PeerTransport> {
        let mut hub = self.network.hub();
        let registered = if hub.endpoints.contains_key(&local_id) {
            tracing::debug!("Memory identity '{}' is taken", local_id);
            sink.emit(TransportEvent::IdentityError(TransportError::IdUnavailable(
                local_id.as_str().to_string(),
            )));
            false
        } else {
            hub.endpoints.insert(
                local_id.clone(),
                Endpoint {
                    sink: sink.clone(),
                    links: BTreeSet::new(),
                    disconnected: false,
                },
            );
            sink.emit(TransportEvent::IdentityOpen);
            true
        };

        Box::new(MemoryTransport {
            network: self.network.clone(),
            local_id,
            sink,
            registered,
        })
    }
}

struct MemoryTransport {
    network: MemoryNetwork,
    local_id: PeerId,
    sink: EventSink,
    registered: bool,
}

impl PeerTransport for MemoryTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn connect(&mut self, remote: &PeerId) -> Result<(), TransportError> {
        if !self.registered {
            return Err(TransportError::Closed);
        }
        let mut hub = self.network.hub();
        let reachable = remote != &self.local_id
            && hub
                .endpoints
                .get(remote)
                .is_some_and(|endpoint| !endpoint.disconnected);
        if !reachable {
            self.sink.emit(TransportEvent::ConnectionError(
                remote.clone(),
                TransportError::PeerUnavailable(remote.as_str().to_string()),
            ));
            return Ok(());
        }

        for (from, to) in [(&self.local_id, remote), (remote, &self.local_id)] {
            if let Some(endpoint) = hub.endpoints.get_mut(from) {
                endpoint.links.insert(to.clone());
            }
        }
        notify(
            &hub,
            remote,
            TransportEvent::IncomingConnection(self.local_id.clone()),
        );
        self.sink
            .emit(TransportEvent::ConnectionOpen(remote.clone()));
        Ok(())
    }

    fn send(&mut self, remote: &PeerId, payload: &str) -> Result<(), TransportError> {
        let mut hub = self.network.hub();
        let linked = self.registered
            && hub
                .endpoints
                .get(&self.local_id)
                .is_some_and(|endpoint| endpoint.links.contains(remote));
        if !linked {
            return Err(TransportError::NotConnected(remote.as_str().to_string()));
        }
        if hub.drop_payloads > 0 {
            hub.drop_payloads -= 1;
            tracing::debug!("Memory network lost a payload {} -> {}", self.local_id, remote);
            return Ok(());
        }
        notify(
            &hub,
            remote,
            TransportEvent::Data(self.local_id.clone(), payload.to_string()),
        );
        Ok(())
    }

    fn close(&mut self, remote: &PeerId) {
        let mut hub = self.network.hub();
        if unlink(&mut hub, &self.local_id, remote) {
            notify(
                &hub,
                remote,
                TransportEvent::ConnectionClosed(self.local_id.clone()),
            );
            self.sink
                .emit(TransportEvent::ConnectionClosed(remote.clone()));
        }
    }

    fn destroy(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        let mut hub = self.network.hub();
        let Some(endpoint) = hub.endpoints.remove(&self.local_id) else {
            return;
        };
        for linked in endpoint.links {
            if let Some(other) = hub.endpoints.get_mut(&linked) {
                other.links.remove(&self.local_id);
                other
                    .sink
                    .emit(TransportEvent::ConnectionClosed(self.local_id.clone()));
            }
        }
    }

    fn is_disconnected(&self) -> bool {
        if !self.registered {
            return true;
        }
        self.network
            .hub()
            .endpoints
            .get(&self.local_id)
            .is_none_or(|endpoint| endpoint.disconnected)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}
