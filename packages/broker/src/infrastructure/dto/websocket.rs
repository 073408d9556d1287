//! WebSocket frame DTOs.
//!
//! Peers and the broker exchange JSON text frames tagged by `type`.
//! The session crate's WebSocket transport reuses these types, so both ends
//! always agree on the wire format.

use serde::{Deserialize, Serialize};

/// Frame a peer sends to the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Connect { dst: String },
    Data { dst: String, payload: String },
    Close { dst: String },
}

/// Frame the broker sends to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BrokerFrame {
    /// Registration accepted
    Open { id: String },
    /// Another peer opened a link to us
    Connection { src: String },
    /// A link we asked for is open
    Accepted { src: String },
    Data { src: String, payload: String },
    Closed { src: String },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_uses_type_tag() {
        // テスト項目: ClientFrame が type タグ付きの JSON になる
        // given (前提条件):
        let frame = ClientFrame::Connect {
            dst: "curryparty-host-abcd1234".to_string(),
        };

        // when (操作):
        let json = serde_json::to_string(&frame).unwrap();

        // then (期待する結果):
        assert_eq!(
            json,
            r#"{"type":"connect","dst":"curryparty-host-abcd1234"}"#
        );
    }

    #[test]
    fn test_error_frame_without_src_omits_field() {
        // テスト項目: src のない error フレームは src フィールドを持たない
        // given (前提条件):
        let frame = BrokerFrame::Error {
            src: None,
            reason: "malformed".to_string(),
        };

        // when (操作):
        let json = serde_json::to_string(&frame).unwrap();

        // then (期待する結果):
        assert_eq!(json, r#"{"type":"error","reason":"malformed"}"#);
    }

    #[test]
    fn test_unknown_client_frame_is_rejected() {
        // テスト項目: 未知の type を持つフレームはデシリアライズに失敗する
        // given (前提条件):
        let json = r#"{"type":"shout","dst":"bob"}"#;

        // when (操作):
        let result = serde_json::from_str::<ClientFrame>(json);

        // then (期待する結果):
        assert!(result.is_err());
    }
}
