//! In-process player with a moving playhead.

use std::sync::{Arc, Mutex, PoisonError};

use curryparty_shared::time::Clock;

use crate::error::AdapterError;

use super::{PlaybackListener, PlaybackState, RawPlaybackEvent, VideoAdapter};

#[derive(Debug)]
struct Playhead {
    /// Position at `anchor`
    position: f64,
    anchor: i64,
    playing: bool,
    autoplay_blocked: bool,
}

impl Playhead {
    fn current_time(&self, now: i64) -> f64 {
        if self.playing {
            self.position + (now - self.anchor) as f64 / 1000.0
        } else {
            self.position
        }
    }

    fn rebase(&mut self, now: i64) {
        self.position = self.current_time(now);
        self.anchor = now;
    }
}

/// A media element simulation driven by a [`Clock`].
///
/// Like a real element, it fires `played`/`paused` only on actual transitions
/// and `seeked` on every seek. Clones share the same player.
#[derive(Clone)]
pub struct SimulatedPlayer {
    clock: Arc<dyn Clock>,
    playhead: Arc<Mutex<Playhead>>,
    listeners: Arc<Mutex<Vec<PlaybackListener>>>,
}

impl SimulatedPlayer {
    /// Paused player at position 0
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let anchor = clock.now_millis();
        Self {
            clock,
            playhead: Arc::new(Mutex::new(Playhead {
                position: 0.0,
                anchor,
                playing: false,
                autoplay_blocked: false,
            })),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make programmatic `play` calls fail as a browser without a user gesture would
    pub fn block_autoplay(&self, blocked: bool) {
        self.lock().autoplay_blocked = blocked;
    }

    /// Play on behalf of the user. Never blocked.
    pub fn user_play(&self) {
        let _ = self.start(true);
    }

    pub fn current_time(&self) -> f64 {
        let now = self.clock.now_millis();
        self.lock().current_time(now)
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn start(&self, by_user: bool) -> Result<(), AdapterError> {
        let now = self.clock.now_millis();
        {
            let mut playhead = self.lock();
            if !by_user && playhead.autoplay_blocked {
                return Err(AdapterError::AutoplayBlocked);
            }
            if playhead.playing {
                return Ok(());
            }
            playhead.rebase(now);
            playhead.playing = true;
        }
        self.fire(RawPlaybackEvent::Played);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Playhead> {
        self.playhead.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, event: RawPlaybackEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(event);
        }
    }
}

impl VideoAdapter for SimulatedPlayer {
    fn play(&self) -> Result<(), AdapterError> {
        self.start(false)
    }

    fn pause(&self) -> Result<(), AdapterError> {
        let now = self.clock.now_millis();
        {
            let mut playhead = self.lock();
            if !playhead.playing {
                return Ok(());
            }
            playhead.rebase(now);
            playhead.playing = false;
        }
        self.fire(RawPlaybackEvent::Paused);
        Ok(())
    }

    fn seek_to(&self, seconds: f64) -> Result<(), AdapterError> {
        let now = self.clock.now_millis();
        {
            let mut playhead = self.lock();
            playhead.position = seconds.max(0.0);
            playhead.anchor = now;
        }
        self.fire(RawPlaybackEvent::Seeked);
        Ok(())
    }

    fn state(&self) -> Option<PlaybackState> {
        let now = self.clock.now_millis();
        let playhead = self.lock();
        Some(PlaybackState {
            current_time: playhead.current_time(now),
            playing: playhead.playing,
        })
    }

    fn subscribe(&self, listener: PlaybackListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}
