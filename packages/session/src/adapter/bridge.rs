//! Message-passing adapter for players that cannot be driven directly.
//!
//! Control calls become `NETFLIX_CONTROL` messages to the page side, which
//! reports state and raw events back. Seek positions travel in milliseconds.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::AdapterError;

use super::{PlaybackListener, PlaybackState, RawPlaybackEvent, VideoAdapter};

pub const BRIDGE_MESSAGE_TYPE: &str = "NETFLIX_CONTROL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BridgeAction {
    Play,
    Pause,
    Seek,
}

/// Control message posted to the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: BridgeAction,
    /// Seek target in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl BridgeMessage {
    fn new(action: BridgeAction, value: Option<i64>) -> Self {
        Self {
            kind: BRIDGE_MESSAGE_TYPE.to_string(),
            action,
            value,
        }
    }
}

#[derive(Default)]
struct Shared {
    state: Option<PlaybackState>,
    listeners: Vec<PlaybackListener>,
}

/// Sync-core side of the bridge
pub struct BridgeAdapter {
    outbox: mpsc::UnboundedSender<String>,
    shared: Arc<Mutex<Shared>>,
}

/// Page side of the bridge: executes control messages and reports back
pub struct BridgePage {
    inbox: mpsc::UnboundedReceiver<String>,
    shared: Arc<Mutex<Shared>>,
}

impl BridgeAdapter {
    pub fn new() -> (Self, BridgePage) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                outbox,
                shared: shared.clone(),
            },
            BridgePage { inbox, shared },
        )
    }

    fn post(&self, action: BridgeAction, value: Option<i64>) -> Result<(), AdapterError> {
        if lock(&self.shared).state.is_none() {
            return Err(AdapterError::NoMedia);
        }
        let json = serde_json::to_string(&BridgeMessage::new(action, value))
            .map_err(|_| AdapterError::BridgeClosed)?;
        self.outbox
            .send(json)
            .map_err(|_| AdapterError::BridgeClosed)
    }
}

impl VideoAdapter for BridgeAdapter {
    fn play(&self) -> Result<(), AdapterError> {
        self.post(BridgeAction::Play, None)
    }

    fn pause(&self) -> Result<(), AdapterError> {
        self.post(BridgeAction::Pause, None)
    }

    fn seek_to(&self, seconds: f64) -> Result<(), AdapterError> {
        let millis = (seconds.max(0.0) * 1000.0).round() as i64;
        self.post(BridgeAction::Seek, Some(millis))
    }

    fn state(&self) -> Option<PlaybackState> {
        lock(&self.shared).state
    }

    fn subscribe(&self, listener: PlaybackListener) {
        lock(&self.shared).listeners.push(listener);
    }
}

impl BridgePage {
    /// Next control message. `None` once the adapter is gone.
    pub async fn next_command(&mut self) -> Option<BridgeMessage> {
        while let Some(raw) = self.inbox.recv().await {
            if let Some(message) = parse(&raw) {
                return Some(message);
            }
        }
        None
    }

    /// Next control message if one is already queued
    pub fn try_next_command(&mut self) -> Option<BridgeMessage> {
        while let Ok(raw) = self.inbox.try_recv() {
            if let Some(message) = parse(&raw) {
                return Some(message);
            }
        }
        None
    }

    pub fn report_state(&self, state: PlaybackState) {
        lock(&self.shared).state = Some(state);
    }

    pub fn report_event(&self, event: RawPlaybackEvent) {
        let listeners = lock(&self.shared).listeners.clone();
        for listener in listeners {
            listener(event);
        }
    }
}

fn parse(raw: &str) -> Option<BridgeMessage> {
    match serde_json::from_str::<BridgeMessage>(raw) {
        Ok(message) if message.kind == BRIDGE_MESSAGE_TYPE => Some(message),
        Ok(message) => {
            tracing::debug!("Ignoring bridge message of type '{}'", message.kind);
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable bridge message: {}", e);
            None
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_without_reported_state_is_no_media() {
        // テスト項目: ページから状態が届くまでは NoMedia になる
        // given (前提条件):
        let (adapter, _page) = BridgeAdapter::new();

        // when (操作):
        let result = adapter.play();

        // then (期待する結果):
        assert_eq!(result, Err(AdapterError::NoMedia));
        assert_eq!(adapter.state(), None);
    }

    #[test]
    fn test_seek_posts_milliseconds() {
        // テスト項目: シーク位置がミリ秒でページへ送られる
        // given (前提条件):
        let (adapter, mut page) = BridgeAdapter::new();
        page.report_state(PlaybackState {
            current_time: 0.0,
            playing: false,
        });

        // when (操作):
        adapter.seek_to(120.5).unwrap();

        // then (期待する結果):
        assert_eq!(
            page.try_next_command(),
            Some(BridgeMessage::new(BridgeAction::Seek, Some(120_500)))
        );
    }

    #[test]
    fn test_control_message_wire_format() {
        // テスト項目: 制御メッセージが NETFLIX_CONTROL 形式の JSON になる
        // given (前提条件):
        let message = BridgeMessage::new(BridgeAction::Pause, None);

        // when (操作):
        let json = serde_json::to_value(&message).unwrap();

        // then (期待する結果):
        assert_eq!(
            json,
            serde_json::json!({ "type": "NETFLIX_CONTROL", "action": "PAUSE" })
        );
    }

    #[test]
    fn test_page_events_reach_subscribers() {
        // テスト項目: ページが報告した生イベントが購読者に届く
        // given (前提条件):
        let (adapter, page) = BridgeAdapter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let target = seen.clone();
        adapter.subscribe(Arc::new(move |event| target.lock().unwrap().push(event)));

        // when (操作):
        page.report_event(RawPlaybackEvent::Seeked);

        // then (期待する結果):
        assert_eq!(*seen.lock().unwrap(), vec![RawPlaybackEvent::Seeked]);
    }

    #[test]
    fn test_closed_page_reports_bridge_closed() {
        // テスト項目: ページ側が破棄されると BridgeClosed になる
        // given (前提条件):
        let (adapter, page) = BridgeAdapter::new();
        page.report_state(PlaybackState {
            current_time: 3.0,
            playing: true,
        });

        // when (操作):
        drop(page);
        let result = adapter.pause();

        // then (期待する結果):
        assert_eq!(result, Err(AdapterError::BridgeClosed));
    }
}
