//! Video Control Adapter capability.
//!
//! The sync core drives playback only through [`VideoAdapter`]. One
//! implementation exists per kind of player and is picked once when the
//! session starts: [`SimulatedPlayer`] stands in for a directly controllable
//! media element, [`BridgeAdapter`] talks to a player that is only reachable
//! through control messages.

mod bridge;
mod simulated;

use std::sync::Arc;

pub use bridge::{BRIDGE_MESSAGE_TYPE, BridgeAction, BridgeAdapter, BridgeMessage, BridgePage};
pub use simulated::SimulatedPlayer;

use crate::error::AdapterError;

/// Position (seconds) and play state read from the player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current_time: f64,
    pub playing: bool,
}

/// Native player event, whether caused by the user or by a programmatic call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawPlaybackEvent {
    Played,
    Paused,
    Seeked,
}

pub type PlaybackListener = Arc<dyn Fn(RawPlaybackEvent) + Send + Sync>;

#[cfg_attr(test, mockall::automock)]
pub trait VideoAdapter: Send + Sync {
    fn play(&self) -> Result<(), AdapterError>;

    fn pause(&self) -> Result<(), AdapterError>;

    fn seek_to(&self, seconds: f64) -> Result<(), AdapterError>;

    /// `None` while no media is available
    fn state(&self) -> Option<PlaybackState>;

    /// Receive every raw event from now on
    fn subscribe(&self, listener: PlaybackListener);
}
