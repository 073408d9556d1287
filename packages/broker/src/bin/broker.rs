//! CurryParty relay broker.
//!
//! Routes frames between peers addressed by logical peer id.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin curryparty-broker
//! cargo run --bin curryparty-broker -- --host 0.0.0.0 --port 9000
//! ```

use std::{collections::HashMap, sync::Arc};

use clap::Parser;
use curryparty_broker::{
    infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryPeerRepository},
    ui::Server,
    usecase::{ListPeersUseCase, RegisterPeerUseCase, RelaySignalUseCase, UnregisterPeerUseCase},
};
use curryparty_shared::logger::setup_logger;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "curryparty-broker")]
#[command(about = "Relay broker for CurryParty watch parties", long_about = None)]
struct Args {
    /// Host address to bind the broker to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the broker to
    #[arg(short = 'p', long, default_value = "9000")]
    port: u16,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    // 1. Create Repository (in-memory directory)
    let repository = Arc::new(InMemoryPeerRepository::new());

    // 2. Create MessagePusher (WebSocket implementation)
    let message_pusher = Arc::new(WebSocketMessagePusher::new(Arc::new(Mutex::new(
        HashMap::new(),
    ))));

    // 3. Create UseCases
    let register_peer_usecase = Arc::new(RegisterPeerUseCase::new(
        repository.clone(),
        message_pusher.clone(),
    ));
    let unregister_peer_usecase = Arc::new(UnregisterPeerUseCase::new(
        repository.clone(),
        message_pusher.clone(),
    ));
    let relay_signal_usecase = Arc::new(RelaySignalUseCase::new(
        repository.clone(),
        message_pusher.clone(),
    ));
    let list_peers_usecase = Arc::new(ListPeersUseCase::new(repository.clone()));

    // 4. Create and run the server
    let server = Server::new(
        register_peer_usecase,
        unregister_peer_usecase,
        relay_signal_usecase,
        list_peers_usecase,
    );
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
