//! Value objects of the broker domain.

use serde::Serialize;

use super::error::ValueObjectError;

/// Maximum length of a peer id.
pub const PEER_ID_MAX_LENGTH: usize = 64;

/// Logical peer id a participant registers under.
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so the id can travel in a
/// query string without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new PeerId after validation
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.is_empty() {
            return Err(ValueObjectError::PeerIdEmpty);
        }
        if value.len() > PEER_ID_MAX_LENGTH {
            return Err(ValueObjectError::PeerIdTooLong(value.len()));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ValueObjectError::PeerIdInvalidCharacter(c));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for PeerId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}
