//! Session Store: the local participant's room identity and its persistence.

use std::{collections::HashMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::SessionError, page::base_url, transport::PeerId};

/// Prefix of the deterministic host transport id
pub const HOST_ID_PREFIX: &str = "curryparty-host-";

/// Longest accepted room id, so the host id fits a 64-character peer id.
pub const ROOM_ID_MAX_LENGTH: usize = 48;

/// Role of the local participant in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Shared room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, SessionError> {
        if value.is_empty() {
            return Err(SessionError::RoomIdEmpty);
        }
        if value.len() > ROOM_ID_MAX_LENGTH {
            return Err(SessionError::RoomIdTooLong(value.len()));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SessionError::RoomIdInvalidCharacter(c));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transport id the host of this room registers under
    pub fn host_peer_id(&self) -> PeerId {
        PeerId::new(format!("{}{}", HOST_ID_PREFIX, self.0))
    }
}

impl TryFrom<String> for RoomId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The live session of this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room_id: RoomId,
    pub role: Role,
    /// Room URL without query or fragment, once known
    pub base_url: Option<String>,
    pub created_at: i64,
}

/// Keys of the persisted session fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKey {
    RoomId,
    IsHost,
    ParticipantCount,
    RoomUrl,
    UserId,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomId => "roomId",
            Self::IsHost => "isHost",
            Self::ParticipantCount => "participantCount",
            Self::RoomUrl => "roomUrl",
            Self::UserId => "userId",
        }
    }

    const ROOM_KEYS: [StoreKey; 4] = [
        Self::RoomId,
        Self::IsHost,
        Self::ParticipantCount,
        Self::RoomUrl,
    ];
}

/// Key/value persistence of session fields
pub trait Persistence: Send {
    fn get(&self, key: StoreKey) -> Option<String>;
    fn set(&mut self, key: StoreKey, value: String);
    fn remove(&mut self, key: StoreKey);
}

/// Process-local persistence
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    values: HashMap<StoreKey, String>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.values.get(&key).cloned()
    }

    fn set(&mut self, key: StoreKey, value: String) {
        self.values.insert(key, value);
    }

    fn remove(&mut self, key: StoreKey) {
        self.values.remove(&key);
    }
}

/// JSON file persistence, rewritten on every change.
///
/// Write failures are logged and otherwise ignored; the in-memory copy stays
/// authoritative for this process.
#[derive(Debug)]
pub struct FilePersistence {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FilePersistence {
    /// Load `path` if it exists, otherwise start empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self { path, values }
    }

    fn flush(&self) {
        let result = serde_json::to_string_pretty(&self.values)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&self.path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!("Failed to write state file {}: {}", self.path.display(), e);
        }
    }
}

impl Persistence for FilePersistence {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.values.get(key.as_str()).cloned()
    }

    fn set(&mut self, key: StoreKey, value: String) {
        self.values.insert(key.as_str().to_string(), value);
        self.flush();
    }

    fn remove(&mut self, key: StoreKey) {
        if self.values.remove(key.as_str()).is_some() {
            self.flush();
        }
    }
}

/// Holds the single live session and mirrors it into persistence
pub struct SessionStore {
    persistence: Box<dyn Persistence>,
    current: Option<Session>,
}

impl SessionStore {
    pub fn new(persistence: Box<dyn Persistence>) -> Self {
        Self {
            persistence,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Become host of `room_id`, replacing any previous session.
    ///
    /// `url` is the host's page; its base becomes the room URL.
    pub fn create_room(&mut self, room_id: RoomId, url: Option<&str>, now: i64) -> &Session {
        self.clear_room_keys();
        let base = url.map(base_url);

        self.persistence
            .set(StoreKey::RoomId, room_id.as_str().to_string());
        self.persistence.set(StoreKey::IsHost, "true".to_string());
        self.persistence
            .set(StoreKey::ParticipantCount, "1".to_string());
        if let Some(base) = &base {
            self.persistence.set(StoreKey::RoomUrl, base.clone());
        }
        tracing::info!("Room '{}' created (url: {:?})", room_id, base);

        self.current.insert(Session {
            room_id,
            role: Role::Host,
            base_url: base,
            created_at: now,
        })
    }

    /// Join `room_id` as a client. The room URL arrives later from the host.
    pub fn join_room(&mut self, room_id: RoomId, now: i64) -> &Session {
        self.clear_room_keys();
        self.persistence
            .set(StoreKey::RoomId, room_id.as_str().to_string());
        self.persistence.set(StoreKey::IsHost, "false".to_string());
        tracing::info!("Joined room '{}'", room_id);

        self.current.insert(Session {
            room_id,
            role: Role::Client,
            base_url: None,
            created_at: now,
        })
    }

    /// Drop the session. Returns the session that was live, if any.
    pub fn leave_room(&mut self) -> Option<Session> {
        self.clear_room_keys();
        let left = self.current.take();
        if let Some(session) = &left {
            tracing::info!("Left room '{}'", session.room_id);
        }
        left
    }

    pub fn set_role(&mut self, role: Role) -> Result<(), SessionError> {
        let session = self.current.as_mut().ok_or(SessionError::NotInRoom)?;
        session.role = role;
        self.persistence
            .set(StoreKey::IsHost, role.is_host().to_string());
        Ok(())
    }

    /// Record a new room URL (stored without query or fragment) and return it
    pub fn set_room_url(&mut self, url: &str) -> Result<String, SessionError> {
        let session = self.current.as_mut().ok_or(SessionError::NotInRoom)?;
        let base = base_url(url);
        session.base_url = Some(base.clone());
        self.persistence.set(StoreKey::RoomUrl, base.clone());
        Ok(base)
    }

    pub fn update_participant_count(&mut self, count: usize) {
        if self.current.is_some() {
            self.persistence
                .set(StoreKey::ParticipantCount, count.to_string());
        }
    }

    pub fn persisted_participant_count(&self) -> Option<usize> {
        self.persistence
            .get(StoreKey::ParticipantCount)
            .and_then(|value| value.parse().ok())
    }

    /// Rebuild the session from persistence (role and room id survive restarts)
    pub fn restore(&mut self, now: i64) -> Option<&Session> {
        let room_id = self
            .persistence
            .get(StoreKey::RoomId)
            .and_then(|value| RoomId::new(value).ok())?;
        let role = match self.persistence.get(StoreKey::IsHost).as_deref() {
            Some("true") => Role::Host,
            _ => Role::Client,
        };
        let base_url = self.persistence.get(StoreKey::RoomUrl);
        tracing::info!("Restored room '{}' as {}", room_id, role);

        Some(&*self.current.insert(Session {
            room_id,
            role,
            base_url,
            created_at: now,
        }))
    }

    /// Stable user id, generated and persisted on first use
    pub fn user_id(&mut self) -> String {
        if let Some(id) = self.persistence.get(StoreKey::UserId) {
            return id;
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.persistence.set(StoreKey::UserId, id.clone());
        id
    }

    pub fn set_user_id(&mut self, user_id: String) {
        self.persistence.set(StoreKey::UserId, user_id);
    }

    fn clear_room_keys(&mut self) {
        for key in StoreKey::ROOM_KEYS {
            self.persistence.remove(key);
        }
    }
}
