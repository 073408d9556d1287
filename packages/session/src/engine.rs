//! The sync engine: one session, driven one input at a time.
//!
//! Inputs are control calls, transport events, raw player events and timer
//! ticks. Timers are deadlines held by the components; whoever drives the
//! engine calls [`SyncEngine::on_tick`] once [`SyncEngine::next_deadline`] has
//! passed.

use std::{sync::Arc, time::Duration};

use curryparty_shared::time::Clock;

use crate::{
    adapter::{RawPlaybackEvent, VideoAdapter},
    config::SyncConfig,
    connection::{ConnectionManager, Inbound, Liveness, Peer, Terminal},
    error::{AdapterError, ProtocolError, SessionError},
    notify::Notifier,
    page::{Site, base_url, detect_site},
    protocol::{Command, EventData, PlayState, SyncData, VideoEventBody, VideoEventType},
    reconcile::{HostNavigation, Reconciler, UrlCheck, check_room_url, host_navigation},
    relay::{EventRelay, RemoteEvent, RemoteOutcome},
    session::{Persistence, Role, RoomId, SessionStore},
    transport::{EventSink, PeerId, TransportEvent, TransportFactory},
};

const NOTICE_DURATION: Duration = Duration::from_millis(3000);
const AUTOPLAY_BLOCKED: &str = "Autoplay blocked. Click play to sync.";
const HOST_MOVED_REDIRECTING: &str = "Host moved to a new page. Redirecting...";
const HOST_MOVED_SYNCING: &str = "Host moved to new page, syncing all peers...";
const REMOVED_BY_HOST: &str = "You were removed from the room by the host.";

/// Collaborators of a session
pub struct EngineDeps {
    pub clock: Arc<dyn Clock>,
    pub factory: Arc<dyn TransportFactory>,
    pub adapter: Arc<dyn VideoAdapter>,
    pub notifier: Arc<dyn Notifier>,
    pub persistence: Box<dyn Persistence>,
    /// Page the local player is on; decides the site
    pub page_url: Option<String>,
    /// Overrides the persisted user id
    pub user_id: Option<String>,
}

/// Read-only view for UI and debug surfaces
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub room_id: Option<RoomId>,
    pub role: Option<Role>,
    pub participant_count: usize,
    pub status: String,
    pub liveness: Liveness,
    pub peers: Vec<Peer>,
    pub room_url: Option<String>,
    pub page_url: Option<String>,
    pub local_peer_id: Option<PeerId>,
    pub reconnect_attempts: u32,
    pub terminal: Option<Terminal>,
}

pub struct SyncEngine {
    clock: Arc<dyn Clock>,
    adapter: Arc<dyn VideoAdapter>,
    notifier: Arc<dyn Notifier>,
    store: SessionStore,
    conn: ConnectionManager,
    relay: EventRelay,
    reconciler: Reconciler,
    site: Site,
    page_url: Option<String>,
    /// Last participant count written to persistence
    participant_count: usize,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, deps: EngineDeps, sink: EventSink) -> Self {
        let mut store = SessionStore::new(deps.persistence);
        if let Some(user_id) = deps.user_id {
            store.set_user_id(user_id);
        }
        let user_id = store.user_id();
        let site = detect_site(deps.page_url.as_deref().unwrap_or_default());
        tracing::info!("Sync engine for user '{}' on site '{}'", user_id, site);

        Self {
            clock: deps.clock,
            adapter: deps.adapter,
            notifier: deps.notifier,
            store,
            conn: ConnectionManager::new(config.clone(), deps.factory, sink),
            relay: EventRelay::new(config.clone(), user_id, site.as_str().to_string()),
            reconciler: Reconciler::new(&config),
            site,
            page_url: deps.page_url,
            participant_count: 0,
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn user_id(&self) -> &str {
        self.relay.user_id()
    }

    pub fn is_in_room(&self) -> bool {
        self.store.current().is_some()
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn room_url(&self) -> Option<String> {
        self.store
            .current()
            .and_then(|session| session.base_url.clone())
    }

    /// Host `room`, leaving any current room first.
    ///
    /// `url` is the host's page; its base becomes the room URL.
    pub fn create_room(&mut self, room: &str, url: Option<&str>) -> Result<(), SessionError> {
        let room_id = RoomId::new(room.to_string())?;
        if self.is_in_room() {
            self.leave_room()?;
        }
        if let Some(url) = url {
            self.page_url = Some(url.to_string());
        }
        let now = self.now();
        let page_url = self.page_url.clone();
        self.store
            .create_room(room_id.clone(), page_url.as_deref(), now);
        self.start(Role::Host, room_id, now);
        Ok(())
    }

    /// Join `room` as a client, leaving any current room first
    pub fn join_room(&mut self, room: &str) -> Result<(), SessionError> {
        let room_id = RoomId::new(room.to_string())?;
        if self.is_in_room() {
            self.leave_room()?;
        }
        let now = self.now();
        self.store.join_room(room_id.clone(), now);
        self.start(Role::Client, room_id, now);
        Ok(())
    }

    /// Resume the persisted session, if any
    pub fn restore(&mut self) -> Result<Option<RoomId>, SessionError> {
        let now = self.now();
        let current = self
            .store
            .current()
            .map(|session| (session.role, session.room_id.clone()));
        if let Some((role, room_id)) = current {
            // Stopped but never left
            if self.conn.role().is_none() {
                self.start(role, room_id.clone(), now);
            }
            return Ok(Some(room_id));
        }
        let Some(session) = self.store.restore(now).cloned() else {
            return Ok(None);
        };
        self.start(session.role, session.room_id.clone(), now);
        Ok(Some(session.room_id))
    }

    fn start(&mut self, role: Role, room_id: RoomId, now: i64) {
        self.relay.reset();
        self.reconciler.stop();
        self.conn.initialize(role, room_id, now);
        if role.is_host() {
            self.reconciler.start(now);
        }
        self.refresh_participant_count();
    }

    /// Stop timers, close every link, destroy the identity and clear the session
    pub fn leave_room(&mut self) -> Result<(), SessionError> {
        if !self.is_in_room() {
            return Err(SessionError::NotInRoom);
        }
        self.stop();
        self.store.leave_room();
        Ok(())
    }

    /// Tear down without forgetting the persisted session
    pub fn stop(&mut self) {
        self.reconciler.stop();
        self.relay.reset();
        self.conn.shutdown();
        self.participant_count = 0;
    }

    /// Switch role in the current room and start over under it
    pub fn set_role(&mut self, role: Role) -> Result<(), SessionError> {
        self.store.set_role(role)?;
        let room_id = self
            .store
            .current()
            .map(|session| session.room_id.clone())
            .ok_or(SessionError::NotInRoom)?;
        let now = self.now();
        self.relay.reset();
        self.reconciler.stop();
        self.conn.reinitialize(role, room_id, now);
        if role.is_host() {
            self.reconciler.start(now);
        }
        self.refresh_participant_count();
        Ok(())
    }

    /// The local page moved to `url`
    pub fn navigate_local(&mut self, url: &str) -> Result<(), SessionError> {
        self.page_url = Some(url.to_string());
        let site = detect_site(url);
        if site != self.site {
            tracing::info!("Site changed from '{}' to '{}'", self.site, site);
            self.site = site;
            self.relay.set_site(site.as_str().to_string());
        }
        let Some(session) = self.store.current() else {
            return Ok(());
        };

        match session.role {
            Role::Host => match host_navigation(session.base_url.as_deref(), url) {
                HostNavigation::Republish(_) => {
                    let room_url = self.store.set_room_url(url)?;
                    tracing::info!("Room URL is now {}", room_url);
                    self.notifier.notify(HOST_MOVED_SYNCING, NOTICE_DURATION);
                    self.conn.broadcast(
                        &Command::RoomUrl {
                            url: room_url,
                            force_redirect: true,
                        },
                        None,
                    );
                }
                HostNavigation::Unchanged => {}
                HostNavigation::Ignored => {
                    tracing::debug!("Host left the room's domain, keeping the room URL");
                }
            },
            Role::Client => {
                if let Some(room_url) = session.base_url.clone()
                    && base_url(url) != room_url
                {
                    self.notifier.offer_redirect(&room_url);
                }
            }
        }
        Ok(())
    }

    /// Host only: remove `peer` from the room. False for an unknown peer.
    pub fn remove_peer(&mut self, peer: &str) -> Result<bool, SessionError> {
        let session = self.store.current().ok_or(SessionError::NotInRoom)?;
        if !session.role.is_host() {
            return Err(SessionError::NotHost);
        }
        let pause = Command::VideoEvent {
            user_id: None,
            site: None,
            event: VideoEventBody {
                event_type: VideoEventType::Pause,
                data: EventData {
                    current_time: self.adapter.state().map(|state| state.current_time),
                    state: None,
                },
                timestamp: Some(self.now()),
            },
        };
        let removed = self.conn.kick(&PeerId::new(peer), &pause);
        self.refresh_participant_count();
        Ok(removed)
    }

    /// A native player event fired
    pub fn on_playback_event(&mut self, event: RawPlaybackEvent) {
        if !self.is_in_room() {
            return;
        }
        let now = self.now();
        self.relay.on_raw_event(event, now);
    }

    pub fn on_transport(&mut self, generation: u64, event: TransportEvent) {
        let now = self.now();
        if let Some(inbound) = self.conn.on_transport(generation, event, now) {
            self.handle_inbound(inbound, now);
        }
        self.refresh_participant_count();
    }

    /// Run every timer that is due
    pub fn on_tick(&mut self) {
        let now = self.now();
        self.conn.on_tick(now);
        self.relay
            .on_tick(now, &mut self.conn, self.adapter.as_ref());

        if self.reconciler.check_due(now)
            && self.conn.role() == Some(Role::Host)
            && let Some(state) = self.adapter.state()
            && let Some(data) = self.reconciler.drift_check(state)
        {
            self.relay
                .emit_local(&mut self.conn, VideoEventType::Sync, data, now);
        }

        if let Some(url) = self.reconciler.take_due_redirect(now) {
            self.notifier.navigate(&url);
            self.page_url = Some(url);
        }
        self.refresh_participant_count();
    }

    /// Earliest pending timer (clock millis)
    pub fn next_deadline(&self) -> Option<i64> {
        [
            self.conn.next_deadline(),
            self.relay.next_deadline(),
            self.reconciler.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn time_until_deadline(&self) -> Option<Duration> {
        let deadline = self.next_deadline()?;
        let wait = (deadline - self.now()).max(0);
        Some(Duration::from_millis(u64::try_from(wait).unwrap_or_default()))
    }

    fn handle_inbound(&mut self, inbound: Inbound, now: i64) {
        let Inbound { from, payload } = inbound;
        if !self.is_in_room() {
            return;
        }
        let command = match Command::decode(&payload) {
            Ok(command) => command,
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::debug!("Ignoring unknown command '{}' from '{}'", kind, from);
                return;
            }
            Err(ProtocolError::Malformed { kind, reason })
                if kind == "videoEvent" && self.conn.role() == Some(Role::Host) =>
            {
                let relayed = self.conn.broadcast_payload(&payload, Some(&from));
                tracing::warn!(
                    "Unreadable videoEvent from '{}' ({}), relayed to {} peer(s)",
                    from,
                    reason,
                    relayed
                );
                return;
            }
            Err(e) => {
                tracing::warn!("Dropping payload from '{}': {}", from, e);
                return;
            }
        };
        let is_host = self.conn.role() == Some(Role::Host);

        match command {
            Command::SyncRequest if is_host => self.answer_sync_request(&from),
            Command::SyncResponse { data } if !is_host => {
                let result = self.relay.apply(
                    self.adapter.as_ref(),
                    VideoEventType::Sync,
                    EventData {
                        current_time: Some(data.current_time),
                        state: Some(data.state),
                    },
                );
                self.report_adapter_result(result);
            }
            Command::RoomUrl {
                url,
                force_redirect,
            } if !is_host => self.on_room_url(&url, force_redirect, now),
            Command::RoomUrlRequest if is_host => {
                if let Some(url) = self.room_url() {
                    self.send(
                        &from,
                        &Command::RoomUrl {
                            url,
                            force_redirect: true,
                        },
                    );
                }
            }
            Command::VideoEvent {
                user_id,
                site,
                event,
            } => {
                let result = self.relay.on_remote_event(
                    &mut self.conn,
                    self.adapter.as_ref(),
                    RemoteEvent {
                        from: &from,
                        payload: &payload,
                        user_id: user_id.as_deref(),
                        site: site.as_deref(),
                        event_type: event.event_type,
                        data: event.data,
                    },
                );
                if let Ok(RemoteOutcome::CrossSite) = result {
                    return;
                }
                self.report_adapter_result(result.map(|_| ()));
            }
            Command::VideoEventAck { data } => {
                tracing::debug!("'{}' acknowledged: {}", from, data.unwrap_or_default());
            }
            Command::Ping { .. } => self.send(&from, &Command::Pong { timestamp: now }),
            Command::Pong { .. } => self.conn.record_pong(now),
            Command::Leave if is_host => self.conn.mark_departed(&from),
            Command::AdminKick { .. } if !is_host && self.conn.host_id().as_ref() == Some(&from) => {
                tracing::info!("Removed from the room by the host");
                self.notifier.notify(REMOVED_BY_HOST, NOTICE_DURATION);
                if let Err(e) = self.leave_room() {
                    tracing::warn!("Leave after kick failed: {}", e);
                }
            }
            other => {
                tracing::debug!("Ignoring {} from '{}' in this role", other.kind(), from);
            }
        }
    }

    fn answer_sync_request(&mut self, from: &PeerId) {
        if let Some(state) = self.adapter.state() {
            self.send(
                from,
                &Command::SyncResponse {
                    data: SyncData {
                        current_time: state.current_time,
                        state: PlayState::from_playing(state.playing),
                    },
                },
            );
        }
        if let Some(url) = self.room_url() {
            self.send(
                from,
                &Command::RoomUrl {
                    url,
                    force_redirect: false,
                },
            );
        }
    }

    fn on_room_url(&mut self, url: &str, force_redirect: bool, now: i64) {
        let room_url = match self.store.set_room_url(url) {
            Ok(room_url) => room_url,
            Err(e) => {
                tracing::warn!("Cannot store room URL: {}", e);
                return;
            }
        };
        match check_room_url(self.page_url.as_deref(), &room_url, force_redirect) {
            UrlCheck::Matches => tracing::debug!("Already on the room URL"),
            UrlCheck::Redirect(url) => {
                tracing::info!("Host moved to {}, redirecting", url);
                self.notifier.notify(HOST_MOVED_REDIRECTING, NOTICE_DURATION);
                self.reconciler.schedule_redirect(url, now);
            }
            UrlCheck::Offer(url) => self.notifier.offer_redirect(&url),
        }
    }

    fn send(&mut self, peer: &PeerId, command: &Command) {
        if let Err(e) = self.conn.send_command(peer, command) {
            tracing::warn!("Could not send {} to '{}': {}", command.kind(), peer, e);
        }
    }

    fn report_adapter_result(&self, result: Result<(), AdapterError>) {
        match result {
            Ok(()) => {}
            Err(AdapterError::AutoplayBlocked) => {
                tracing::warn!("Autoplay blocked while applying a remote event");
                self.notifier.notify(AUTOPLAY_BLOCKED, NOTICE_DURATION);
            }
            Err(e) => tracing::warn!("Could not apply remote event: {}", e),
        }
    }

    fn refresh_participant_count(&mut self) {
        if !self.is_in_room() {
            return;
        }
        let count = self.conn.participant_count();
        if count != self.participant_count {
            tracing::debug!("Participant count: {}", count);
            self.participant_count = count;
            self.store.update_participant_count(count);
        }
    }

    fn status(&self) -> String {
        let Some(session) = self.store.current() else {
            return "Not connected".to_string();
        };
        if let Some(terminal) = self.conn.terminal() {
            return terminal.message().to_string();
        }
        if self.conn.reconnect_pending() {
            return format!("Reconnecting (attempt {})", self.conn.reconnect_attempts());
        }

        let label = match session.role {
            Role::Host => "Connected (Host)",
            Role::Client => "Connected",
        };
        let mut status = format!(
            "{}: {} ({} in room)",
            label,
            session.room_id,
            self.conn.participant_count()
        );
        let mismatch = match (&session.base_url, &self.page_url) {
            (Some(room_url), Some(page_url)) => base_url(page_url) != *room_url,
            _ => false,
        };
        if mismatch {
            status.push_str(" ⚠️ URL mismatch");
        }
        status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.store.current();
        SessionSnapshot {
            room_id: session.map(|session| session.room_id.clone()),
            role: session.map(|session| session.role),
            participant_count: self.conn.participant_count(),
            status: self.status(),
            liveness: self.conn.liveness(self.now()),
            peers: self.conn.registry(),
            room_url: session.and_then(|session| session.base_url.clone()),
            page_url: self.page_url.clone(),
            local_peer_id: self.conn.local_id().cloned(),
            reconnect_attempts: self.conn.reconnect_attempts(),
            terminal: self.conn.terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use curryparty_shared::time::ManualClock;
    use mockall::predicate::eq;

    use crate::{
        adapter::{MockVideoAdapter, PlaybackState, SimulatedPlayer},
        notify::{MockNotifier, RecordingNotifier},
        session::MemoryPersistence,
        transport::MemoryNetwork,
    };

    use super::*;

    type Queue = Arc<Mutex<Vec<(u64, TransportEvent)>>>;

    fn engine_with(adapter: Arc<dyn VideoAdapter>, notifier: Arc<dyn Notifier>) -> (SyncEngine, Queue) {
        let queue: Queue = Arc::new(Mutex::new(Vec::new()));
        let target = queue.clone();
        let sink = EventSink::new(0, move |generation, event| {
            target.lock().unwrap().push((generation, event));
        });
        let deps = EngineDeps {
            clock: Arc::new(ManualClock::new(1_000)),
            factory: Arc::new(MemoryNetwork::new().factory()),
            adapter,
            notifier,
            persistence: Box::new(MemoryPersistence::new()),
            page_url: Some("https://www.youtube.com/watch?v=abc".to_string()),
            user_id: Some("u1".to_string()),
        };
        (SyncEngine::new(SyncConfig::default(), deps, sink), queue)
    }

    fn drain(engine: &mut SyncEngine, queue: &Queue) {
        loop {
            let batch: Vec<_> = queue.lock().unwrap().drain(..).collect();
            if batch.is_empty() {
                return;
            }
            for (generation, event) in batch {
                engine.on_transport(generation, event);
            }
        }
    }

    fn simulated() -> Arc<dyn VideoAdapter> {
        Arc::new(SimulatedPlayer::new(Arc::new(ManualClock::new(1_000))))
    }

    #[test]
    fn test_status_outside_room() {
        // テスト項目: ルーム外では "Not connected" になる
        // given (前提条件):
        let (engine, _) = engine_with(simulated(), Arc::new(RecordingNotifier::new()));

        // when (操作):
        let snapshot = engine.snapshot();

        // then (期待する結果):
        assert_eq!(snapshot.status, "Not connected");
        assert_eq!(snapshot.room_id, None);
    }

    #[test]
    fn test_create_room_reports_host_status() {
        // テスト項目: ルーム作成後はホストとしての状態文字列になる
        // given (前提条件):
        let (mut engine, queue) = engine_with(simulated(), Arc::new(RecordingNotifier::new()));

        // when (操作):
        engine
            .create_room("abcd1234", Some("https://www.youtube.com/watch?v=abc"))
            .unwrap();
        drain(&mut engine, &queue);

        // then (期待する結果):
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status, "Connected (Host): abcd1234 (1 in room)");
        assert_eq!(
            snapshot.room_url.as_deref(),
            Some("https://www.youtube.com/watch")
        );
        assert_eq!(
            snapshot.local_peer_id,
            Some(PeerId::new("curryparty-host-abcd1234"))
        );
    }

    #[test]
    fn test_invalid_room_id_is_rejected() {
        // テスト項目: 不正なルーム ID ではルームを作れない
        // given (前提条件):
        let (mut engine, _) = engine_with(simulated(), Arc::new(RecordingNotifier::new()));

        // when (操作):
        let result = engine.join_room("bad room");

        // then (期待する結果):
        assert_eq!(result, Err(SessionError::RoomIdInvalidCharacter(' ')));
        assert!(!engine.is_in_room());
    }

    #[test]
    fn test_host_navigation_shows_mismatch_for_other_domain() {
        // テスト項目: ホストが別ドメインに移動すると URL 不一致が表示される
        // given (前提条件):
        let notifier = MockNotifier::new();
        let (mut engine, queue) = engine_with(simulated(), Arc::new(notifier));
        engine
            .create_room("abcd1234", Some("https://svc.example/show/ep1"))
            .unwrap();
        drain(&mut engine, &queue);

        // when (操作):
        engine.navigate_local("https://mail.example/inbox").unwrap();

        // then (期待する結果):
        let snapshot = engine.snapshot();
        assert_eq!(
            snapshot.room_url.as_deref(),
            Some("https://svc.example/show/ep1")
        );
        assert!(snapshot.status.ends_with(" ⚠️ URL mismatch"));
    }

    #[test]
    fn test_host_same_domain_navigation_notifies() {
        // テスト項目: ホストの同一ドメイン内移動で通知が出てルーム URL が変わる
        // given (前提条件):
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .with(eq(HOST_MOVED_SYNCING), eq(NOTICE_DURATION))
            .times(1)
            .return_const(());
        let (mut engine, queue) = engine_with(simulated(), Arc::new(notifier));
        engine
            .create_room("abcd1234", Some("https://svc.example/show/ep1"))
            .unwrap();
        drain(&mut engine, &queue);

        // when (操作):
        engine.navigate_local("https://svc.example/show/ep2").unwrap();

        // then (期待する結果):
        assert_eq!(
            engine.snapshot().room_url.as_deref(),
            Some("https://svc.example/show/ep2")
        );
    }

    #[test]
    fn test_remove_peer_requires_host() {
        // テスト項目: クライアントはピアを退出させられない
        // given (前提条件):
        let (mut engine, _) = engine_with(simulated(), Arc::new(RecordingNotifier::new()));
        engine.join_room("abcd1234").unwrap();

        // when (操作):
        let result = engine.remove_peer("curryparty-peer-r12345678");

        // then (期待する結果):
        assert_eq!(result, Err(SessionError::NotHost));
    }

    #[test]
    fn test_leave_room_outside_room_fails() {
        // テスト項目: ルーム外での退出は NotInRoom になる
        // given (前提条件):
        let (mut engine, _) = engine_with(simulated(), Arc::new(RecordingNotifier::new()));

        // when (操作):
        let result = engine.leave_room();

        // then (期待する結果):
        assert_eq!(result, Err(SessionError::NotInRoom));
    }

    #[test]
    fn test_playback_events_outside_room_are_ignored() {
        // テスト項目: ルーム外ではローカルイベントを処理しない
        // given (前提条件):
        let mut adapter = MockVideoAdapter::new();
        adapter.expect_state().never();
        let (mut engine, _) = engine_with(Arc::new(adapter), Arc::new(RecordingNotifier::new()));

        // when (操作):
        engine.on_playback_event(RawPlaybackEvent::Played);

        // then (期待する結果):
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_host_periodic_sync_is_scheduled() {
        // テスト項目: ホストは定期同期のタイマーを持つ
        // given (前提条件):
        let mut adapter = MockVideoAdapter::new();
        adapter.expect_state().return_const(Some(PlaybackState {
            current_time: 0.0,
            playing: false,
        }));
        let (mut engine, queue) = engine_with(Arc::new(adapter), Arc::new(RecordingNotifier::new()));

        // when (操作):
        engine.create_room("abcd1234", None).unwrap();
        drain(&mut engine, &queue);

        // then (期待する結果):
        assert_eq!(engine.next_deadline(), Some(2_000));
        assert_eq!(engine.time_until_deadline(), Some(Duration::from_millis(1_000)));
    }
}
