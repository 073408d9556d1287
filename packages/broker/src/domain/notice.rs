//! Signals received from peers and notices pushed back to them.

use super::value_object::PeerId;

/// A request a registered peer sends to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Open a link to `dst`
    Connect { dst: PeerId },
    /// Deliver `payload` over the link to `dst`
    Data { dst: PeerId, payload: String },
    /// Close the link to `dst`
    Close { dst: PeerId },
}

/// Why the broker refused a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    PeerUnavailable,
    NotLinked,
    Malformed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerUnavailable => "peer-unavailable",
            Self::NotLinked => "not-linked",
            Self::Malformed => "malformed",
        }
    }
}

/// Something the broker tells a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Registration under `id` succeeded
    Opened { id: PeerId },
    /// `src` opened a link to the receiver
    Incoming { src: PeerId },
    /// The link the receiver asked for towards `src` is open
    Accepted { src: PeerId },
    /// Payload from `src`, in send order
    Data { src: PeerId, payload: String },
    /// The link with `src` is gone
    Closed { src: PeerId },
    /// A signal was refused
    Failed {
        src: Option<PeerId>,
        reason: FailureReason,
    },
}
