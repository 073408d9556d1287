//! Commands exchanged between participants over the peer transport.
//!
//! Every command is a JSON object with a `type` discriminator. Unknown types
//! are reported as [`ProtocolError::UnknownType`] so the caller can ignore them
//! without treating the payload as broken.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Discriminators this protocol understands
const KNOWN_TYPES: [&str; 10] = [
    "syncRequest",
    "syncResponse",
    "roomUrl",
    "roomUrlRequest",
    "videoEvent",
    "videoEventResponse",
    "ping",
    "pong",
    "leave",
    "adminCommand",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
}

impl PlayState {
    pub fn from_playing(playing: bool) -> Self {
        if playing { Self::Playing } else { Self::Paused }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEventType {
    Play,
    Pause,
    Seek,
    Sync,
}

impl VideoEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek => "seek",
            Self::Sync => "sync",
        }
    }
}

/// Position and (for `sync`) play state carried by a video event
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlayState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEventBody {
    pub event_type: VideoEventType,
    #[serde(default)]
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Host playback state sent in reply to `syncRequest`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncData {
    pub current_time: f64,
    pub state: PlayState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminAction {
    Kick,
}

/// A wire command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    SyncRequest,
    SyncResponse {
        data: SyncData,
    },
    RoomUrl {
        url: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        force_redirect: bool,
    },
    RoomUrlRequest,
    VideoEvent {
        /// Absent on events the host synthesizes (kick)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site: Option<String>,
        event: VideoEventBody,
    },
    #[serde(rename = "videoEventResponse")]
    VideoEventAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    Ping {
        #[serde(default)]
        timestamp: i64,
    },
    Pong {
        #[serde(default)]
        timestamp: i64,
    },
    Leave,
    #[serde(rename = "adminCommand")]
    AdminKick {
        command: AdminAction,
    },
}

impl Command {
    pub fn video_event(
        user_id: &str,
        site: &str,
        event_type: VideoEventType,
        data: EventData,
        timestamp: i64,
    ) -> Self {
        Self::VideoEvent {
            user_id: Some(user_id.to_string()),
            site: Some(site.to_string()),
            event: VideoEventBody {
                event_type,
                data,
                timestamp: Some(timestamp),
            },
        }
    }

    pub fn ack() -> Self {
        Self::VideoEventAck {
            data: Some("OK".to_string()),
        }
    }

    pub fn kick() -> Self {
        Self::AdminKick {
            command: AdminAction::Kick,
        }
    }

    /// Wire discriminator of this command
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncRequest => "syncRequest",
            Self::SyncResponse { .. } => "syncResponse",
            Self::RoomUrl { .. } => "roomUrl",
            Self::RoomUrlRequest => "roomUrlRequest",
            Self::VideoEvent { .. } => "videoEvent",
            Self::VideoEventAck { .. } => "videoEventResponse",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Leave => "leave",
            Self::AdminKick { .. } => "adminCommand",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }
}
