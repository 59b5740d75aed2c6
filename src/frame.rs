//! Frame: wire model for the live-presence channel.
//!
//! ARCHITECTURE
//! ============
//! Two layers live here. The domain payloads (`CursorState`, `PresenceMeta`,
//! `PresenceState`) are what the channel carries between visitors. The
//! `Frame` envelope is what the relay and the websocket adapter exchange:
//! every message is a frame with a namespaced `syscall`, and responses
//! correlate to requests via `parent_id`.
//!
//! DESIGN
//! ======
//! - Flat data: frame payload is always `Map<String, Value>`.
//! - `ChannelEvent` is the typed form of an inbound frame. Translation in
//!   both directions lives here so the relay and the adapter agree on it.
//! - Unparseable inbound frames translate to `None`, never an error: the
//!   channel payload shape is not contractually validated.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for the retryable flag on error frames.
pub const FRAME_RETRYABLE: &str = "retryable";

/// Broadcast event name used for pointer positions.
pub const CURSOR_EVENT: &str = "cursor";

pub const SYSCALL_SUBSCRIBE: &str = "channel:subscribe";
pub const SYSCALL_UNSUBSCRIBE: &str = "channel:unsubscribe";
pub const SYSCALL_TRACK: &str = "presence:track";
pub const SYSCALL_UNTRACK: &str = "presence:untrack";
pub const SYSCALL_SEND: &str = "broadcast:send";
pub const SYSCALL_SYNC: &str = "presence:sync";
pub const SYSCALL_JOIN: &str = "presence:join";
pub const SYSCALL_LEAVE: &str = "presence:leave";

// =============================================================================
// DOMAIN TYPES
// =============================================================================

/// Page section a visitor is currently viewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Hero,
    About,
    Skills,
    Projects,
    Contact,
}

impl Section {
    pub const ALL: [Section; 5] = [Self::Hero, Self::About, Self::Skills, Self::Projects, Self::Contact];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::About => "about",
            Self::Skills => "skills",
            Self::Projects => "projects",
            Self::Contact => "contact",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| format!("unknown section: {s}"))
    }
}

/// A remote visitor's pointer, as broadcast on the `cursor` event and as
/// held in the cursor store. Coordinates are viewport percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub section: Section,
    pub color: String,
    /// Sender clock, milliseconds since Unix epoch.
    #[serde(rename = "lastSeen")]
    pub last_seen: i64,
}

/// Metadata a client announces with `track`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    /// ISO-8601 timestamp of when this client came online.
    pub online_at: String,
    pub section: String,
}

impl PresenceMeta {
    #[must_use]
    pub fn new(online_at: impl Into<String>, section: Section) -> Self {
        Self { online_at: online_at.into(), section: section.as_str().to_string() }
    }
}

/// Full presence snapshot: presence key -> metas tracked under that key.
pub type PresenceState = BTreeMap<String, Vec<PresenceMeta>>;

/// Presence event classes a handle can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceEventKind {
    Sync,
    Join,
    Leave,
}

/// Typed event delivered by a channel subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Sync(PresenceState),
    Join { key: String, meta: PresenceMeta },
    Leave { key: String },
    Broadcast { event: String, payload: serde_json::Value },
}

impl ChannelEvent {
    /// Presence class of this event, `None` for broadcasts.
    #[must_use]
    pub fn presence_kind(&self) -> Option<PresenceEventKind> {
        match self {
            Self::Sync(_) => Some(PresenceEventKind::Sync),
            Self::Join { .. } => Some(PresenceEventKind::Join),
            Self::Leave { .. } => Some(PresenceEventKind::Leave),
            Self::Broadcast { .. } => None,
        }
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Current UTC time as an RFC 3339 string, for `online_at`.
#[must_use]
pub fn now_iso8601() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Lifecycle position of a frame.
///
/// Client operations are `request → done` or `request → error`. Channel
/// events pushed by the relay are bare requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Done,
    Error,
}

/// The relay message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub syscall: String,
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

/// Grepable error code and retryable flag for structured error frames.
pub trait ErrorCode: fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl Frame {
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            topic: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create a done response. Terminal, carries no data.
    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Data::new())
    }

    /// Create a structured error response from a typed error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_CODE.into(), serde_json::Value::String(err.error_code().to_string()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(err.to_string()));
        data.insert(FRAME_RETRYABLE.into(), serde_json::Value::Bool(err.retryable()));
        self.reply(Status::Error, data)
    }

    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            topic: self.topic.clone(),
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Extract the syscall prefix (everything before the first ':').
    #[must_use]
    pub fn prefix(&self) -> &str {
        let Some((prefix, _)) = self.syscall.split_once(':') else {
            return &self.syscall;
        };
        prefix
    }

    /// Extract the syscall operation (everything after the first ':').
    #[must_use]
    pub fn op(&self) -> &str {
        self.syscall.split_once(':').map_or("", |(_, op)| op)
    }

    /// String field from `data`, if present.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

// =============================================================================
// EVENT <-> FRAME
// =============================================================================

impl ChannelEvent {
    /// Render this event as a relay push frame on `topic`.
    #[must_use]
    pub fn to_frame(&self, topic: &str) -> Frame {
        let frame = match self {
            Self::Sync(state) => Frame::request(SYSCALL_SYNC, Data::new())
                .with_data("state", serde_json::to_value(state).unwrap_or_default()),
            Self::Join { key, meta } => Frame::request(SYSCALL_JOIN, Data::new())
                .with_data("key", key.as_str())
                .with_data("meta", serde_json::to_value(meta).unwrap_or_default()),
            Self::Leave { key } => Frame::request(SYSCALL_LEAVE, Data::new()).with_data("key", key.as_str()),
            Self::Broadcast { event, payload } => {
                Frame::request(format!("broadcast:{event}"), Data::new()).with_data("payload", payload.clone())
            }
        };
        frame.with_topic(topic)
    }

    /// Parse a relay push frame. Returns `None` for anything that is not a
    /// well-formed channel event.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.status != Status::Request {
            return None;
        }
        match frame.syscall.as_str() {
            SYSCALL_SYNC => {
                let state = frame.data.get("state")?;
                serde_json::from_value(state.clone()).map(Self::Sync).ok()
            }
            SYSCALL_JOIN => {
                let key = frame.data_str("key")?.to_string();
                let meta = serde_json::from_value(frame.data.get("meta")?.clone()).ok()?;
                Some(Self::Join { key, meta })
            }
            SYSCALL_LEAVE => Some(Self::Leave { key: frame.data_str("key")?.to_string() }),
            _ if frame.prefix() == "broadcast" && !frame.op().is_empty() => Some(Self::Broadcast {
                event: frame.op().to_string(),
                payload: frame.data.get("payload").cloned().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
