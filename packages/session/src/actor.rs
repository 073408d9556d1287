//! Session actor: runs a [`SyncEngine`] on its own tokio task.
//!
//! Control calls, transport events and player events all arrive on one
//! unbounded channel and are handled in order. Between inputs the task sleeps
//! until the engine's next deadline. A snapshot is published after every input.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    adapter::RawPlaybackEvent,
    config::SyncConfig,
    engine::{EngineDeps, SessionSnapshot, SyncEngine},
    error::SessionError,
    session::{Role, RoomId},
    transport::{EventSink, TransportEvent},
};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Control {
    CreateRoom {
        room: String,
        url: Option<String>,
        reply: Reply<()>,
    },
    JoinRoom {
        room: String,
        reply: Reply<()>,
    },
    Restore {
        reply: Reply<Option<RoomId>>,
    },
    SetRole {
        role: Role,
        reply: Reply<()>,
    },
    Navigate {
        url: String,
        reply: Reply<()>,
    },
    RemovePeer {
        peer: String,
        reply: Reply<bool>,
    },
}

enum Input {
    Control(Control),
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Playback(RawPlaybackEvent),
    /// Stop the actor; `leave` also clears the session
    Shutdown { leave: bool },
}

/// Handle to a running session. Dropping it stops the session.
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<Input>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Start the session task. Must be called inside a tokio runtime.
    pub fn spawn(config: SyncConfig, deps: EngineDeps) -> Self {
        let (inputs, rx) = mpsc::unbounded_channel();

        let transport_inputs = inputs.clone();
        let sink = EventSink::new(0, move |generation, event| {
            let _ = transport_inputs.send(Input::Transport { generation, event });
        });
        let playback_inputs = inputs.clone();
        deps.adapter.subscribe(Arc::new(move |event| {
            let _ = playback_inputs.send(Input::Playback(event));
        }));

        let engine = SyncEngine::new(config, deps, sink);
        let (publisher, snapshots) = watch::channel(engine.snapshot());
        let task = tokio::spawn(run(engine, rx, publisher));

        Self {
            inputs,
            snapshots,
            task: Some(task),
        }
    }

    async fn call<T>(
        &self,
        control: impl FnOnce(Reply<T>) -> Control,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(Input::Control(control(reply)))
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    pub async fn create_room(&self, room: &str, url: Option<&str>) -> Result<(), SessionError> {
        let room = room.to_string();
        let url = url.map(str::to_string);
        self.call(|reply| Control::CreateRoom { room, url, reply })
            .await
    }

    pub async fn join_room(&self, room: &str) -> Result<(), SessionError> {
        let room = room.to_string();
        self.call(|reply| Control::JoinRoom { room, reply }).await
    }

    /// Resume the persisted session, if there is one
    pub async fn restore(&self) -> Result<Option<RoomId>, SessionError> {
        self.call(|reply| Control::Restore { reply }).await
    }

    pub async fn set_role(&self, role: Role) -> Result<(), SessionError> {
        self.call(|reply| Control::SetRole { role, reply }).await
    }

    pub async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let url = url.to_string();
        self.call(|reply| Control::Navigate { url, reply }).await
    }

    pub async fn remove_peer(&self, peer: &str) -> Result<bool, SessionError> {
        let peer = peer.to_string();
        self.call(|reply| Control::RemovePeer { peer, reply }).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Leave the room and stop the actor
    pub async fn leave(mut self) {
        let _ = self.inputs.send(Input::Shutdown { leave: true });
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!("Session task failed: {}", e);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.inputs.send(Input::Shutdown { leave: false });
        }
    }
}

async fn run(
    mut engine: SyncEngine,
    mut inputs: mpsc::UnboundedReceiver<Input>,
    publisher: watch::Sender<SessionSnapshot>,
) {
    loop {
        let input = match engine.time_until_deadline() {
            Some(wait) => {
                tokio::select! {
                    input = inputs.recv() => input,
                    _ = tokio::time::sleep(wait) => {
                        engine.on_tick();
                        publisher.send_replace(engine.snapshot());
                        continue;
                    }
                }
            }
            None => inputs.recv().await,
        };
        let Some(input) = input else {
            break;
        };

        match input {
            Input::Control(control) => handle_control(&mut engine, control),
            Input::Transport { generation, event } => engine.on_transport(generation, event),
            Input::Playback(event) => engine.on_playback_event(event),
            Input::Shutdown { leave } => {
                if leave {
                    if let Err(e) = engine.leave_room() {
                        tracing::debug!("Leave on shutdown: {}", e);
                    }
                } else {
                    engine.stop();
                }
                publisher.send_replace(engine.snapshot());
                break;
            }
        }
        publisher.send_replace(engine.snapshot());
    }
    tracing::debug!("Session actor stopped");
}

fn handle_control(engine: &mut SyncEngine, control: Control) {
    // A dropped reply only means the caller stopped waiting.
    match control {
        Control::CreateRoom { room, url, reply } => {
            let _ = reply.send(engine.create_room(&room, url.as_deref()));
        }
        Control::JoinRoom { room, reply } => {
            let _ = reply.send(engine.join_room(&room));
        }
        Control::Restore { reply } => {
            let _ = reply.send(engine.restore());
        }
        Control::SetRole { role, reply } => {
            let _ = reply.send(engine.set_role(role));
        }
        Control::Navigate { url, reply } => {
            let _ = reply.send(engine.navigate_local(&url));
        }
        Control::RemovePeer { peer, reply } => {
            let _ = reply.send(engine.remove_peer(&peer));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use curryparty_shared::time::SystemClock;

    use crate::{
        adapter::{SimulatedPlayer, VideoAdapter},
        notify::RecordingNotifier,
        session::MemoryPersistence,
        transport::MemoryNetwork,
    };

    use super::*;

    fn spawn(network: &MemoryNetwork, player: SimulatedPlayer) -> SessionHandle {
        SessionHandle::spawn(
            SyncConfig::default(),
            EngineDeps {
                clock: Arc::new(SystemClock),
                factory: Arc::new(network.factory()),
                adapter: Arc::new(player),
                notifier: Arc::new(RecordingNotifier::new()),
                persistence: Box::new(MemoryPersistence::new()),
                page_url: None,
                user_id: None,
            },
        )
    }

    async fn wait_for(
        handle: &SessionHandle,
        predicate: impl Fn(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut snapshots = handle.subscribe();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            snapshots.wait_for(|snapshot| predicate(snapshot)),
        )
        .await
        .expect("timed out waiting for snapshot")
        .expect("session stopped")
        .clone();
        snapshot
    }

    #[tokio::test]
    async fn test_client_joins_host_through_actor() {
        // テスト項目: アクター経由でクライアントがホストのルームに参加できる
        // given (前提条件):
        let network = MemoryNetwork::new();
        let host = spawn(&network, SimulatedPlayer::new(Arc::new(SystemClock)));
        host.create_room("abcd1234", None).await.unwrap();

        // when (操作):
        let client = spawn(&network, SimulatedPlayer::new(Arc::new(SystemClock)));
        client.join_room("abcd1234").await.unwrap();

        // then (期待する結果):
        let snapshot = wait_for(&host, |snapshot| snapshot.participant_count == 2).await;
        assert_eq!(snapshot.status, "Connected (Host): abcd1234 (2 in room)");
        let snapshot = wait_for(&client, |snapshot| snapshot.participant_count == 2).await;
        assert_eq!(snapshot.status, "Connected: abcd1234 (2 in room)");
    }

    #[tokio::test]
    async fn test_host_play_reaches_client() {
        // テスト項目: ホストの再生がクライアントのプレイヤーに反映される
        // given (前提条件):
        let network = MemoryNetwork::new();
        let host_player = SimulatedPlayer::new(Arc::new(SystemClock));
        let host = spawn(&network, host_player.clone());
        host.create_room("abcd1234", None).await.unwrap();
        let client_player = SimulatedPlayer::new(Arc::new(SystemClock));
        let client = spawn(&network, client_player.clone());
        client.join_room("abcd1234").await.unwrap();
        wait_for(&host, |snapshot| snapshot.participant_count == 2).await;

        // when (操作):
        host_player.user_play();

        // then (期待する結果):
        tokio::time::timeout(Duration::from_secs(5), async {
            while !client_player.is_playing() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("client never started playing");
        assert!(client_player.state().is_some());
    }

    #[tokio::test]
    async fn test_leave_stops_actor_and_frees_identity() {
        // テスト項目: leave でアクターが止まりホスト ID が解放される
        // given (前提条件):
        let network = MemoryNetwork::new();
        let host = spawn(&network, SimulatedPlayer::new(Arc::new(SystemClock)));
        host.create_room("abcd1234", None).await.unwrap();
        wait_for(&host, |snapshot| snapshot.local_peer_id.is_some()).await;

        // when (操作):
        host.leave().await;

        // then (期待する結果):
        assert!(!network.is_registered(&crate::transport::PeerId::new(
            "curryparty-host-abcd1234"
        )));
    }

    #[tokio::test]
    async fn test_calls_after_stop_fail() {
        // テスト項目: アクター停止後の呼び出しは Stopped になる
        // given (前提条件):
        let network = MemoryNetwork::new();
        let host = spawn(&network, SimulatedPlayer::new(Arc::new(SystemClock)));
        let _ = host.inputs.send(Input::Shutdown { leave: false });

        // when (操作):
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = host.join_room("abcd1234").await;

        // then (期待する結果):
        assert_eq!(result, Err(SessionError::Stopped));
    }
}
