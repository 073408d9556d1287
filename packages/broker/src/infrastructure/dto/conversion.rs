//! Conversion logic between DTOs and domain types.

use curryparty_shared::time::timestamp_to_rfc3339;

use crate::domain::{Notice, PeerId, RegisteredPeer, Signal, ValueObjectError};
use crate::infrastructure::dto::{http::PeerSummaryDto, websocket as dto};

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<dto::ClientFrame> for Signal {
    type Error = ValueObjectError;

    fn try_from(frame: dto::ClientFrame) -> Result<Self, Self::Error> {
        Ok(match frame {
            dto::ClientFrame::Connect { dst } => Signal::Connect {
                dst: PeerId::new(dst)?,
            },
            dto::ClientFrame::Data { dst, payload } => Signal::Data {
                dst: PeerId::new(dst)?,
                payload,
            },
            dto::ClientFrame::Close { dst } => Signal::Close {
                dst: PeerId::new(dst)?,
            },
        })
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<Notice> for dto::BrokerFrame {
    fn from(notice: Notice) -> Self {
        match notice {
            Notice::Opened { id } => Self::Open {
                id: id.into_string(),
            },
            Notice::Incoming { src } => Self::Connection {
                src: src.into_string(),
            },
            Notice::Accepted { src } => Self::Accepted {
                src: src.into_string(),
            },
            Notice::Data { src, payload } => Self::Data {
                src: src.into_string(),
                payload,
            },
            Notice::Closed { src } => Self::Closed {
                src: src.into_string(),
            },
            Notice::Failed { src, reason } => Self::Error {
                src: src.map(PeerId::into_string),
                reason: reason.as_str().to_string(),
            },
        }
    }
}

impl From<RegisteredPeer> for PeerSummaryDto {
    fn from(peer: RegisteredPeer) -> Self {
        Self {
            id: peer.id.into_string(),
            registered_at: timestamp_to_rfc3339(peer.registered_at.value()),
            links: peer.links.into_iter().map(PeerId::into_string).collect(),
        }
    }
}
