//! Transport binding for the CurryParty relay broker.
//!
//! Each identity is one WebSocket to `<broker>?id=<peer id>`. Link management
//! and payloads travel as the broker's JSON frames.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use curryparty_broker::infrastructure::dto::websocket::{BrokerFrame, ClientFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use url::Url;

use crate::error::TransportError;

use super::{EventSink, PeerId, PeerTransport, TransportEvent, TransportFactory};

/// Opens identities on a relay broker
#[derive(Debug, Clone)]
pub struct WebSocketTransportFactory {
    broker: Url,
}

impl WebSocketTransportFactory {
    /// `broker` is the WebSocket endpoint, e.g. `ws://127.0.0.1:9000/peerjs`
    pub fn new(broker: &str) -> Result<Self, TransportError> {
        let broker = Url::parse(broker).map_err(|e| TransportError::Network(e.to_string()))?;
        match broker.scheme() {
            "ws" | "wss" => Ok(Self { broker }),
            other => Err(TransportError::Network(format!(
                "unsupported broker scheme '{}'",
                other
            ))),
        }
    }

    fn endpoint_for(&self, id: &PeerId) -> Url {
        let mut url = self.broker.clone();
        url.query_pairs_mut().append_pair("id", id.as_str());
        url
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn open(&self, local_id: PeerId, sink: EventSink) -> Box<dyn PeerTransport> {
        let flags = Arc::new(Flags::default());
        let (outbox, rx) = mpsc::unbounded_channel();

        if tokio::runtime::Handle::try_current().is_err() {
            flags.disconnected.store(true, Ordering::SeqCst);
            sink.emit(TransportEvent::IdentityError(TransportError::Network(
                "no async runtime".to_string(),
            )));
            return Box::new(WebSocketTransport {
                local_id,
                sink,
                outbox: None,
                flags,
            });
        }

        tokio::spawn(run_connection(
            self.endpoint_for(&local_id),
            local_id.clone(),
            sink.clone(),
            rx,
            flags.clone(),
        ));

        Box::new(WebSocketTransport {
            local_id,
            sink,
            outbox: Some(outbox),
            flags,
        })
    }
}

#[derive(Default)]
struct Flags {
    disconnected: AtomicBool,
    destroyed: AtomicBool,
}

struct WebSocketTransport {
    local_id: PeerId,
    sink: EventSink,
    /// Dropping the sender ends the connection task
    outbox: Option<mpsc::UnboundedSender<ClientFrame>>,
    flags: Arc<Flags>,
}

impl WebSocketTransport {
    fn push(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outbox
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }
}

impl PeerTransport for WebSocketTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn connect(&mut self, remote: &PeerId) -> Result<(), TransportError> {
        self.push(ClientFrame::Connect {
            dst: remote.as_str().to_string(),
        })
    }

    fn send(&mut self, remote: &PeerId, payload: &str) -> Result<(), TransportError> {
        self.push(ClientFrame::Data {
            dst: remote.as_str().to_string(),
            payload: payload.to_string(),
        })
    }

    fn close(&mut self, remote: &PeerId) {
        if self
            .push(ClientFrame::Close {
                dst: remote.as_str().to_string(),
            })
            .is_ok()
        {
            self.sink
                .emit(TransportEvent::ConnectionClosed(remote.clone()));
        }
    }

    fn destroy(&mut self) {
        self.flags.destroyed.store(true, Ordering::SeqCst);
        self.outbox = None;
    }

    fn is_disconnected(&self) -> bool {
        self.outbox.is_none() || self.flags.disconnected.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn run_connection(
    endpoint: Url,
    local_id: PeerId,
    sink: EventSink,
    mut outbox: mpsc::UnboundedReceiver<ClientFrame>,
    flags: Arc<Flags>,
) {
    let socket = match connect_async(endpoint.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            flags.disconnected.store(true, Ordering::SeqCst);
            let error = match e {
                WsError::Http(response) if response.status().as_u16() == 409 => {
                    TransportError::IdUnavailable(local_id.as_str().to_string())
                }
                other => TransportError::Network(other.to_string()),
            };
            tracing::warn!("Broker rejected identity '{}': {}", local_id, error);
            if !flags.destroyed.load(Ordering::SeqCst) {
                sink.emit(TransportEvent::IdentityError(error));
            }
            return;
        }
    };
    tracing::debug!("Connected to broker as '{}'", local_id);

    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            frame = outbox.recv() => match frame {
                Some(frame) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("Failed to encode frame: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        tracing::warn!("Broker write failed for '{}': {}", local_id, e);
                        break;
                    }
                }
                None => {
                    let _ = write.close().await;
                    tracing::debug!("Identity '{}' closed", local_id);
                    return;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => handle_frame(&sink, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Broker read failed for '{}': {}", local_id, e);
                    break;
                }
            },
        }
    }

    flags.disconnected.store(true, Ordering::SeqCst);
    if !flags.destroyed.load(Ordering::SeqCst) {
        tracing::info!("Identity '{}' lost its broker connection", local_id);
        sink.emit(TransportEvent::IdentityDisconnected);
    }
}

fn handle_frame(sink: &EventSink, text: &str) {
    let frame = match serde_json::from_str::<BrokerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Ignoring unreadable broker frame: {}", e);
            return;
        }
    };
    if let Some(event) = frame_to_event(frame) {
        sink.emit(event);
    }
}

fn frame_to_event(frame: BrokerFrame) -> Option<TransportEvent> {
    match frame {
        BrokerFrame::Open { .. } => Some(TransportEvent::IdentityOpen),
        BrokerFrame::Connection { src } => {
            Some(TransportEvent::IncomingConnection(PeerId::new(src)))
        }
        BrokerFrame::Accepted { src } => Some(TransportEvent::ConnectionOpen(PeerId::new(src))),
        BrokerFrame::Data { src, payload } => Some(TransportEvent::Data(PeerId::new(src), payload)),
        BrokerFrame::Closed { src } => Some(TransportEvent::ConnectionClosed(PeerId::new(src))),
        BrokerFrame::Error {
            src: Some(src),
            reason,
        } => {
            let error = match reason.as_str() {
                "peer-unavailable" => TransportError::PeerUnavailable(src.clone()),
                "not-linked" => TransportError::NotConnected(src.clone()),
                other => TransportError::Network(other.to_string()),
            };
            Some(TransportEvent::ConnectionError(PeerId::new(src), error))
        }
        BrokerFrame::Error { src: None, reason } => {
            tracing::warn!("Broker reported an error: {}", reason);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_carries_peer_id_query() {
        // テスト項目: ブローカーの URL に id クエリが付く
        // given (前提条件):
        let factory = WebSocketTransportFactory::new("ws://127.0.0.1:9000/peerjs").unwrap();

        // when (操作):
        let url = factory.endpoint_for(&PeerId::new("curryparty-host-abcd1234"));

        // then (期待する結果):
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9000/peerjs?id=curryparty-host-abcd1234"
        );
    }

    #[test]
    fn test_factory_rejects_http_scheme() {
        // テスト項目: ws / wss 以外のスキームは拒否される
        // given (前提条件):
        let broker = "http://127.0.0.1:9000/peerjs";

        // when (操作):
        let result = WebSocketTransportFactory::new(broker);

        // then (期待する結果):
        assert!(matches!(result, Err(TransportError::Network(_))));
    }

    #[test]
    fn test_error_frame_maps_to_connection_error() {
        // テスト項目: peer-unavailable の error フレームが ConnectionError になる
        // given (前提条件):
        let frame = BrokerFrame::Error {
            src: Some("curryparty-host-abcd1234".to_string()),
            reason: "peer-unavailable".to_string(),
        };

        // when (操作):
        let event = frame_to_event(frame);

        // then (期待する結果):
        assert_eq!(
            event,
            Some(TransportEvent::ConnectionError(
                PeerId::new("curryparty-host-abcd1234"),
                TransportError::PeerUnavailable("curryparty-host-abcd1234".to_string()),
            ))
        );
    }

    #[test]
    fn test_open_outside_runtime_reports_error() {
        // テスト項目: 非同期ランタイム外で開くと IdentityError が届く
        // given (前提条件):
        let factory = WebSocketTransportFactory::new("ws://127.0.0.1:9/peerjs").unwrap();
        let recorded = Arc::new(std::sync::Mutex::new(Vec::new()));
        let target = recorded.clone();
        let sink = EventSink::new(1, move |_, event| target.lock().unwrap().push(event));

        // when (操作):
        let transport = factory.open(PeerId::new("client"), sink);

        // then (期待する結果):
        assert!(transport.is_disconnected());
        assert!(matches!(
            recorded.lock().unwrap().first(),
            Some(TransportEvent::IdentityError(TransportError::Network(_)))
        ));
    }
}
