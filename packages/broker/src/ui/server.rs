//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::usecase::{
    ListPeersUseCase, RegisterPeerUseCase, RelaySignalUseCase, UnregisterPeerUseCase,
};

use super::{
    handler::{health_check, list_peers, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Relay broker server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(register, unregister, relay, list);
/// server.run("127.0.0.1".to_string(), 9000).await?;
/// ```
pub struct Server {
    /// RegisterPeerUseCase（ピア登録のユースケース）
    register_peer_usecase: Arc<RegisterPeerUseCase>,
    /// UnregisterPeerUseCase（ピア登録解除のユースケース）
    unregister_peer_usecase: Arc<UnregisterPeerUseCase>,
    /// RelaySignalUseCase（シグナル中継のユースケース）
    relay_signal_usecase: Arc<RelaySignalUseCase>,
    /// ListPeersUseCase（ピア一覧取得のユースケース）
    list_peers_usecase: Arc<ListPeersUseCase>,
}

impl Server {
    pub fn new(
        register_peer_usecase: Arc<RegisterPeerUseCase>,
        unregister_peer_usecase: Arc<UnregisterPeerUseCase>,
        relay_signal_usecase: Arc<RelaySignalUseCase>,
        list_peers_usecase: Arc<ListPeersUseCase>,
    ) -> Self {
        Self {
            register_peer_usecase,
            unregister_peer_usecase,
            relay_signal_usecase,
            list_peers_usecase,
        }
    }

    /// Build the router with all endpoints
    pub fn router(self) -> Router {
        let app_state = Arc::new(AppState {
            register_peer_usecase: self.register_peer_usecase,
            unregister_peer_usecase: self.unregister_peer_usecase,
            relay_signal_usecase: self.relay_signal_usecase,
            list_peers_usecase: self.list_peers_usecase,
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/peerjs", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/peers", get(list_peers))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the broker until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Relay broker listening on {}", listener.local_addr()?);
        tracing::info!("Peers connect to: ws://{}/peerjs?id=<peer id>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
