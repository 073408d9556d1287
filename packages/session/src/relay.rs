//! Event Relay: local playback events out, remote video events in.

use std::collections::BTreeMap;

use crate::{
    adapter::{PlaybackState, RawPlaybackEvent, VideoAdapter},
    config::{SyncConfig, millis},
    connection::ConnectionManager,
    error::AdapterError,
    protocol::{Command, EventData, PlayState, VideoEventType},
    session::Role,
    transport::PeerId,
};

/// Pending "suppress the next local event of this type" marks.
///
/// A mark is added right before the adapter is driven on behalf of a remote
/// command, and consumed by the native event that call produces. Marks are
/// counted, so a burst of remote commands swallows every native event it causes.
#[derive(Debug, Default)]
pub struct EchoGuard {
    pending: BTreeMap<VideoEventType, u32>,
}

impl EchoGuard {
    pub fn arm(&mut self, event_type: VideoEventType) {
        *self.pending.entry(event_type).or_insert(0) += 1;
    }

    /// Withdraw one mark, for an adapter call that failed
    pub fn disarm(&mut self, event_type: VideoEventType) {
        self.take(event_type);
    }

    /// Consume one mark. True when the event must be suppressed.
    pub fn take(&mut self, event_type: VideoEventType) -> bool {
        match self.pending.get_mut(&event_type) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.pending.remove(&event_type);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, event_type: VideoEventType) -> bool {
        self.pending.contains_key(&event_type)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Drops a repeat of the last sent type inside the window
#[derive(Debug)]
pub struct Debouncer {
    window: i64,
    last: Option<(VideoEventType, i64)>,
}

impl Debouncer {
    pub fn new(window_millis: i64) -> Self {
        Self {
            window: window_millis,
            last: None,
        }
    }

    /// True if the event may go out. Admitted events become the new reference.
    pub fn admit(&mut self, event_type: VideoEventType, now: i64) -> bool {
        if let Some((last_type, at)) = self.last
            && last_type == event_type
            && now - at < self.window
        {
            return false;
        }
        self.last = Some((event_type, now));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// A `videoEvent` as received, with the raw payload for relaying
#[derive(Debug, Clone, Copy)]
pub struct RemoteEvent<'a> {
    pub from: &'a PeerId,
    pub payload: &'a str,
    pub user_id: Option<&'a str>,
    pub site: Option<&'a str>,
    pub event_type: VideoEventType,
    pub data: EventData,
}

/// What happened to an inbound video event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Applied,
    /// Same user on another site
    CrossSite,
}

pub struct EventRelay {
    config: SyncConfig,
    user_id: String,
    site: String,
    echo: EchoGuard,
    debouncer: Debouncer,
    /// Raw play/pause waiting to be checked against the player
    confirmations: Vec<(i64, VideoEventType)>,
    seek_settle_at: Option<i64>,
    follow_up_at: Option<i64>,
}

impl EventRelay {
    pub fn new(config: SyncConfig, user_id: String, site: String) -> Self {
        let debouncer = Debouncer::new(millis(config.debounce_window));
        Self {
            config,
            user_id,
            site,
            echo: EchoGuard::default(),
            debouncer,
            confirmations: Vec::new(),
            seek_settle_at: None,
            follow_up_at: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The local page moved to another site
    pub fn set_site(&mut self, site: String) {
        self.site = site;
    }

    pub fn echo_guard(&self) -> &EchoGuard {
        &self.echo
    }

    /// Forget pending timers, flags and debounce history
    pub fn reset(&mut self) {
        self.echo.clear();
        self.debouncer.reset();
        self.confirmations.clear();
        self.seek_settle_at = None;
        self.follow_up_at = None;
    }

    /// A native player event fired
    pub fn on_raw_event(&mut self, event: RawPlaybackEvent, now: i64) {
        let event_type = match event {
            RawPlaybackEvent::Played => VideoEventType::Play,
            RawPlaybackEvent::Paused => VideoEventType::Pause,
            RawPlaybackEvent::Seeked => VideoEventType::Seek,
        };
        if self.echo.take(event_type) {
            tracing::debug!("Suppressed echo of remote {}", event_type.as_str());
            return;
        }
        match event_type {
            VideoEventType::Seek => {
                self.seek_settle_at = Some(now + millis(self.config.seek_debounce));
            }
            _ => self
                .confirmations
                .push((now + millis(self.config.play_pause_confirm), event_type)),
        }
    }

    /// Send whatever deferred local events are due
    pub fn on_tick(&mut self, now: i64, conn: &mut ConnectionManager, adapter: &dyn VideoAdapter) {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .confirmations
            .drain(..)
            .partition(|(at, _)| *at <= now);
        self.confirmations = waiting;
        for (_, event_type) in due {
            let Some(state) = adapter.state() else {
                continue;
            };
            let still_holds = match event_type {
                VideoEventType::Play => state.playing,
                _ => !state.playing,
            };
            if still_holds {
                self.emit_local(conn, event_type, position(state), now);
            }
        }

        if self.seek_settle_at.is_some_and(|at| at <= now) {
            self.seek_settle_at = None;
            if let Some(state) = adapter.state() {
                self.emit_local(conn, VideoEventType::Seek, position(state), now);
                self.follow_up_at = Some(now + millis(self.config.seek_follow_up));
            }
        }

        if self.follow_up_at.is_some_and(|at| at <= now) {
            self.follow_up_at = None;
            if let Some(state) = adapter.state() {
                let event_type = if state.playing {
                    VideoEventType::Play
                } else {
                    VideoEventType::Pause
                };
                self.emit_local(conn, event_type, position(state), now);
            }
        }
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.confirmations
            .iter()
            .map(|(at, _)| *at)
            .chain(self.seek_settle_at)
            .chain(self.follow_up_at)
            .min()
    }

    /// Send a local event to the room. Returns whether it went out.
    ///
    /// A client without an open host link schedules a reconnect and drops the
    /// event; the next sync recovers the state.
    pub fn emit_local(
        &mut self,
        conn: &mut ConnectionManager,
        event_type: VideoEventType,
        data: EventData,
        now: i64,
    ) -> bool {
        if !self.debouncer.admit(event_type, now) {
            tracing::debug!("Debounced duplicate {} event", event_type.as_str());
            return false;
        }
        let command = Command::video_event(&self.user_id, &self.site, event_type, data, now);

        match conn.role() {
            Some(Role::Host) => {
                let sent = conn.broadcast(&command, None);
                tracing::debug!("Broadcast {} to {} peer(s)", event_type.as_str(), sent);
                true
            }
            Some(Role::Client) => match conn.send_to_host(&command) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Dropping {} event: {}", event_type.as_str(), e);
                    conn.schedule_reconnect(now);
                    false
                }
            },
            None => false,
        }
    }

    /// Handle a `videoEvent` from a linked peer.
    ///
    /// A host forwards the payload verbatim to every other open link.
    pub fn on_remote_event(
        &mut self,
        conn: &mut ConnectionManager,
        adapter: &dyn VideoAdapter,
        event: RemoteEvent<'_>,
    ) -> Result<RemoteOutcome, AdapterError> {
        let RemoteEvent {
            from,
            payload,
            user_id,
            site,
            event_type,
            data,
        } = event;
        if user_id == Some(self.user_id.as_str()) && site.is_some_and(|site| site != self.site) {
            tracing::debug!(
                "Ignoring {} from the same user on '{}'",
                event_type.as_str(),
                site.unwrap_or_default()
            );
            return Ok(RemoteOutcome::CrossSite);
        }

        let applied = self.apply(adapter, event_type, data);

        if let Err(e) = conn.send_command(from, &Command::ack()) {
            tracing::debug!("Could not acknowledge event from '{}': {}", from, e);
        }
        if conn.role() == Some(Role::Host) {
            let relayed = conn.broadcast_payload(payload, Some(from));
            tracing::debug!("Relayed {} to {} peer(s)", event_type.as_str(), relayed);
        }

        applied.map(|()| RemoteOutcome::Applied)
    }

    /// Drive the player for a remote event, arming echo flags first
    pub fn apply(
        &mut self,
        adapter: &dyn VideoAdapter,
        event_type: VideoEventType,
        data: EventData,
    ) -> Result<(), AdapterError> {
        let Some(state) = adapter.state() else {
            return Err(AdapterError::NoMedia);
        };

        match event_type {
            VideoEventType::Play => {
                if state.playing {
                    return Ok(());
                }
                if let Some(time) = data.current_time {
                    self.seek(adapter, time)?;
                }
                self.play(adapter)
            }
            VideoEventType::Pause => {
                if !state.playing {
                    return Ok(());
                }
                if let Some(time) = data.current_time {
                    self.seek(adapter, time)?;
                }
                self.echo.arm(VideoEventType::Pause);
                adapter.pause().inspect_err(|_| self.echo.disarm(VideoEventType::Pause))
            }
            VideoEventType::Seek => match data.current_time {
                Some(time) if (state.current_time - time).abs() > self.config.seek_tolerance => {
                    self.seek(adapter, time)
                }
                _ => Ok(()),
            },
            VideoEventType::Sync => {
                if let Some(time) = data.current_time
                    && (state.current_time - time).abs() > self.config.sync_tolerance
                {
                    self.seek(adapter, time)?;
                }
                match data.state {
                    Some(PlayState::Playing) if !state.playing => self.play(adapter),
                    Some(PlayState::Paused) if state.playing => {
                        self.echo.arm(VideoEventType::Pause);
                        adapter
                            .pause()
                            .inspect_err(|_| self.echo.disarm(VideoEventType::Pause))
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    fn seek(&mut self, adapter: &dyn VideoAdapter, time: f64) -> Result<(), AdapterError> {
        self.echo.arm(VideoEventType::Seek);
        adapter
            .seek_to(time)
            .inspect_err(|_| self.echo.disarm(VideoEventType::Seek))
    }

    fn play(&mut self, adapter: &dyn VideoAdapter) -> Result<(), AdapterError> {
        self.echo.arm(VideoEventType::Play);
        adapter
            .play()
            .inspect_err(|_| self.echo.disarm(VideoEventType::Play))
    }
}

fn position(state: PlaybackState) -> EventData {
    EventData {
        current_time: Some(state.current_time),
        state: None,
    }
}
