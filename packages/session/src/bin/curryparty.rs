//! CurryParty session from the terminal.
//!
//! Hosts or joins a room on a relay broker and drives a simulated player from
//! a prompt, so several terminals can watch "together".
//!
//! Run with:
//! ```not_rust
//! cargo run --bin curryparty-broker
//! cargo run --bin curryparty -- host --room movie-night --url https://www.youtube.com/watch?v=abc
//! cargo run --bin curryparty -- join --room movie-night
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use curryparty_session::{
    actor::SessionHandle,
    adapter::{
        BridgeAction, BridgeAdapter, BridgeMessage, BridgePage, PlaybackState, SimulatedPlayer,
        VideoAdapter,
    },
    cli::{HELP, ReplCommand, format_peers, format_status, redisplay_prompt},
    config::SyncConfig,
    engine::EngineDeps,
    notify::TracingNotifier,
    page::detect_site,
    session::{FilePersistence, MemoryPersistence, Persistence},
    transport::{MemoryNetwork, TransportFactory, WebSocketTransportFactory},
};
use curryparty_shared::{logger::setup_logger, time::SystemClock};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

const PROMPT: &str = "curryparty> ";

#[derive(Parser, Debug)]
#[command(name = "curryparty")]
#[command(about = "Watch-party session with a simulated player", long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Relay broker WebSocket endpoint
    #[arg(short = 'b', long, default_value = "ws://127.0.0.1:9000/peerjs")]
    broker: String,

    /// Stable user id (generated and persisted when absent)
    #[arg(long)]
    user_id: Option<String>,

    /// Disable the periodic drift check
    #[arg(long)]
    no_periodic_sync: bool,

    /// Persist the session to this JSON file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Use an in-process network instead of the broker
    #[arg(long)]
    offline: bool,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Create a room and become its host
    Host {
        #[arg(short, long)]
        room: String,
        /// Page the host is watching
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Join an existing room
    Join {
        #[arg(short, long)]
        room: String,
        /// Page this participant is on
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Resume the session saved in --state-file
    Resume,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let factory: Arc<dyn TransportFactory> = if args.offline {
        Arc::new(MemoryNetwork::new().factory())
    } else {
        Arc::new(WebSocketTransportFactory::new(&args.broker)?)
    };

    let page_url = match &args.mode {
        Mode::Host { url, .. } | Mode::Join { url, .. } => url.clone(),
        Mode::Resume => None,
    };
    let site = detect_site(page_url.as_deref().unwrap_or_default());

    let player = SimulatedPlayer::new(Arc::new(SystemClock));
    let adapter: Arc<dyn VideoAdapter> = if site.needs_bridge() {
        let (adapter, page) = BridgeAdapter::new();
        tokio::spawn(run_bridge_page(page, player.clone()));
        Arc::new(adapter)
    } else {
        Arc::new(player.clone())
    };

    let persistence: Box<dyn Persistence> = match &args.state_file {
        Some(path) => Box::new(FilePersistence::open(path.clone())),
        None => Box::new(MemoryPersistence::new()),
    };
    let config = SyncConfig {
        periodic_reconcile: !args.no_periodic_sync,
        ..SyncConfig::default()
    };

    let handle = SessionHandle::spawn(
        config,
        EngineDeps {
            clock: Arc::new(SystemClock),
            factory,
            adapter,
            notifier: Arc::new(TracingNotifier),
            persistence,
            page_url,
            user_id: args.user_id,
        },
    );

    match &args.mode {
        Mode::Host { room, url } => handle.create_room(room, url.as_deref()).await?,
        Mode::Join { room, .. } => handle.join_room(room).await?,
        Mode::Resume => {
            if handle.restore().await?.is_none() {
                return Err("no saved session to resume".into());
            }
        }
    }
    println!("\nWatching on '{}'. Type `help` for commands.\n", site);

    let mut snapshots = handle.subscribe();
    tokio::spawn(async move {
        let mut last = String::new();
        while snapshots.changed().await.is_ok() {
            let status = snapshots.borrow_and_update().status.clone();
            if status != last {
                println!("\n[{}]", status);
                redisplay_prompt(PROMPT);
                last = status;
            }
        }
    });

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };
        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    while let Some(line) = input_rx.recv().await {
        match ReplCommand::parse(&line) {
            Ok(ReplCommand::Leave) => break,
            Ok(command) => execute(&handle, &player, command).await,
            Err(e) => println!("{}", e),
        }
    }

    handle.leave().await;
    tracing::info!("Left the room");
    Ok(())
}

async fn execute(handle: &SessionHandle, player: &SimulatedPlayer, command: ReplCommand) {
    match command {
        ReplCommand::Play => player.user_play(),
        ReplCommand::Pause => {
            if let Err(e) = player.pause() {
                println!("pause failed: {}", e);
            }
        }
        ReplCommand::Seek(seconds) => {
            if let Err(e) = player.seek_to(seconds) {
                println!("seek failed: {}", e);
            }
        }
        ReplCommand::Navigate(url) => {
            if let Err(e) = handle.navigate(&url).await {
                println!("{}", e);
            }
        }
        ReplCommand::Status => print!(
            "{}",
            format_status(&handle.snapshot(), player.current_time(), player.is_playing())
        ),
        ReplCommand::Peers => print!("{}", format_peers(&handle.snapshot().peers)),
        ReplCommand::Kick(peer) => match handle.remove_peer(&peer).await {
            Ok(true) => println!("Removed '{}'", peer),
            Ok(false) => println!("No peer '{}'", peer),
            Err(e) => println!("{}", e),
        },
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Leave => {}
    }
}

/// Page side of the player bridge, backed by the simulated player
async fn run_bridge_page(mut page: BridgePage, player: SimulatedPlayer) {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    player.subscribe(Arc::new(move |event| {
        let _ = events_tx.send(event);
    }));
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        page.report_state(PlaybackState {
            current_time: player.current_time(),
            playing: player.is_playing(),
        });
        tokio::select! {
            command = page.next_command() => match command {
                Some(command) => apply_bridge_command(&player, command),
                None => break,
            },
            Some(event) = events.recv() => {
                page.report_state(PlaybackState {
                    current_time: player.current_time(),
                    playing: player.is_playing(),
                });
                page.report_event(event);
            }
            _ = ticker.tick() => {}
        }
    }
}

fn apply_bridge_command(player: &SimulatedPlayer, command: BridgeMessage) {
    let result = match command.action {
        BridgeAction::Play => player.play(),
        BridgeAction::Pause => player.pause(),
        BridgeAction::Seek => player.seek_to(command.value.unwrap_or_default() as f64 / 1000.0),
    };
    if let Err(e) = result {
        tracing::warn!("Bridge command {:?} failed: {}", command.action, e);
    }
}
