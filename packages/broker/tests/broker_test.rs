//! Integration tests for the relay broker, served in-process on an ephemeral port.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use curryparty_broker::{
    infrastructure::{
        dto::{
            http::{HealthDto, PeerSummaryDto},
            websocket::{BrokerFrame, ClientFrame},
        },
        message_pusher::WebSocketMessagePusher,
        repository::InMemoryPeerRepository,
    },
    ui::Server,
    usecase::{ListPeersUseCase, RegisterPeerUseCase, RelaySignalUseCase, UnregisterPeerUseCase},
};
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message, handshake::client::Response},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper struct to manage an in-process broker
struct TestBroker {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestBroker {
    async fn start() -> Self {
        let repository = Arc::new(InMemoryPeerRepository::new());
        let pusher = Arc::new(WebSocketMessagePusher::new(Arc::new(Mutex::new(
            HashMap::new(),
        ))));
        let server = Server::new(
            Arc::new(RegisterPeerUseCase::new(repository.clone(), pusher.clone())),
            Arc::new(UnregisterPeerUseCase::new(repository.clone(), pusher.clone())),
            Arc::new(RelaySignalUseCase::new(repository.clone(), pusher.clone())),
            Arc::new(ListPeersUseCase::new(repository)),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    fn ws_url(&self, id: &str) -> String {
        format!("ws://{}/peerjs?id={}", self.addr, id)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = timeout(Duration::from_secs(5), self.handle).await;
    }
}

async fn connect(broker: &TestBroker, id: &str) -> Socket {
    let (mut socket, _) = connect_async(broker.ws_url(id)).await.unwrap();
    let frame = next_frame(&mut socket).await;
    assert_eq!(frame, BrokerFrame::Open { id: id.to_string() });
    socket
}

async fn send(socket: &mut Socket, frame: ClientFrame) {
    let json = serde_json::to_string(&frame).unwrap();
    socket.send(Message::Text(json.into())).await.unwrap();
}

async fn next_frame(socket: &mut Socket) -> BrokerFrame {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn http_status(result: Result<(Socket, Response), WsError>) -> u16 {
    match result {
        Err(WsError::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("connection unexpectedly succeeded"),
    }
}

#[tokio::test]
async fn test_duplicate_peer_id_is_rejected_with_conflict() {
    // テスト項目: 既に使われているピア ID での接続は 409 で拒否される
    // given (前提条件):
    let broker = TestBroker::start().await;
    let _host = connect(&broker, "curryparty-host-abcd1234").await;

    // when (操作):
    let result = connect_async(broker.ws_url("curryparty-host-abcd1234")).await;

    // then (期待する結果):
    assert_eq!(http_status(result), 409);
    broker.stop().await;
}

#[tokio::test]
async fn test_invalid_peer_id_is_rejected_with_bad_request() {
    // テスト項目: 不正な文字を含むピア ID は 400 で拒否される
    // given (前提条件):
    let broker = TestBroker::start().await;

    // when (操作):
    let result = connect_async(broker.ws_url("bad%20id")).await;

    // then (期待する結果):
    assert_eq!(http_status(result), 400);
    broker.stop().await;
}

#[tokio::test]
async fn test_link_and_exchange_payloads() {
    // テスト項目: クライアントがホストにリンクし、双方向にペイロードを送れる
    // given (前提条件):
    let broker = TestBroker::start().await;
    let mut host = connect(&broker, "curryparty-host-abcd1234").await;
    let mut client = connect(&broker, "client-1").await;

    // when (操作):
    send(
        &mut client,
        ClientFrame::Connect {
            dst: "curryparty-host-abcd1234".to_string(),
        },
    )
    .await;
    let incoming = next_frame(&mut host).await;
    let accepted = next_frame(&mut client).await;
    send(
        &mut client,
        ClientFrame::Data {
            dst: "curryparty-host-abcd1234".to_string(),
            payload: r#"{"type":"syncRequest"}"#.to_string(),
        },
    )
    .await;
    let request = next_frame(&mut host).await;
    send(
        &mut host,
        ClientFrame::Data {
            dst: "client-1".to_string(),
            payload: r#"{"type":"syncResponse","data":{"currentTime":120.5,"state":"playing"}}"#
                .to_string(),
        },
    )
    .await;
    let response = next_frame(&mut client).await;

    // then (期待する結果):
    assert_eq!(
        incoming,
        BrokerFrame::Connection {
            src: "client-1".to_string()
        }
    );
    assert_eq!(
        accepted,
        BrokerFrame::Accepted {
            src: "curryparty-host-abcd1234".to_string()
        }
    );
    assert_eq!(
        request,
        BrokerFrame::Data {
            src: "client-1".to_string(),
            payload: r#"{"type":"syncRequest"}"#.to_string(),
        }
    );
    assert!(matches!(response, BrokerFrame::Data { src, .. } if src == "curryparty-host-abcd1234"));
    broker.stop().await;
}

#[tokio::test]
async fn test_connect_to_missing_host_reports_peer_unavailable() {
    // テスト項目: ホストが存在しないルームへの接続は peer-unavailable が返る
    // given (前提条件):
    let broker = TestBroker::start().await;
    let mut client = connect(&broker, "client-1").await;

    // when (操作):
    send(
        &mut client,
        ClientFrame::Connect {
            dst: "curryparty-host-nobody".to_string(),
        },
    )
    .await;

    // then (期待する結果):
    assert_eq!(
        next_frame(&mut client).await,
        BrokerFrame::Error {
            src: Some("curryparty-host-nobody".to_string()),
            reason: "peer-unavailable".to_string(),
        }
    );
    broker.stop().await;
}

#[tokio::test]
async fn test_host_disconnect_notifies_linked_client() {
    // テスト項目: ホストが切断するとリンク中のクライアントに closed が届く
    // given (前提条件):
    let broker = TestBroker::start().await;
    let mut host = connect(&broker, "curryparty-host-abcd1234").await;
    let mut client = connect(&broker, "client-1").await;
    send(
        &mut client,
        ClientFrame::Connect {
            dst: "curryparty-host-abcd1234".to_string(),
        },
    )
    .await;
    next_frame(&mut host).await;
    next_frame(&mut client).await;

    // when (操作):
    host.close(None).await.unwrap();

    // then (期待する結果):
    assert_eq!(
        next_frame(&mut client).await,
        BrokerFrame::Closed {
            src: "curryparty-host-abcd1234".to_string()
        }
    );
    broker.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_reports_error() {
    // テスト項目: 解析できないフレームには malformed エラーが返る
    // given (前提条件):
    let broker = TestBroker::start().await;
    let mut client = connect(&broker, "client-1").await;

    // when (操作):
    client
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(
        next_frame(&mut client).await,
        BrokerFrame::Error {
            src: None,
            reason: "malformed".to_string(),
        }
    );
    broker.stop().await;
}

#[tokio::test]
async fn test_http_endpoints_report_registered_peers() {
    // テスト項目: /api/health と /api/peers が登録中のピアを返す
    // given (前提条件):
    let broker = TestBroker::start().await;
    let _host = connect(&broker, "curryparty-host-abcd1234").await;
    let _client = connect(&broker, "client-1").await;

    // when (操作):
    let health: HealthDto = reqwest::get(broker.http_url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let peers: Vec<PeerSummaryDto> = reqwest::get(broker.http_url("/api/peers"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(health.status, "ok");
    assert_eq!(health.peers, 2);
    let ids: Vec<&str> = peers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["client-1", "curryparty-host-abcd1234"]);
    broker.stop().await;
}
