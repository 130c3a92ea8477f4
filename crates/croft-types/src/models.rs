use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A farmer's identity record. Created on first connect, mutated by
/// presence heartbeats, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmerProfile {
    pub id: Uuid,
    /// Caller-supplied external identifier (non-empty).
    pub farmer_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Voice,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = UnknownMessageKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "system" => Ok(Self::System),
            other => Err(UnknownMessageKind(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown message kind: {0}")]
pub struct UnknownMessageKind(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub profile_id: Uuid,
    /// Denormalized author display name, joined in by the hub so clients
    /// never need a second lookup per message.
    pub author_name: String,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub voice_url: Option<String>,
    pub voice_duration_secs: Option<f64>,
    pub reply_to: Option<Uuid>,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How long a typing indicator stays on without a refresh. Shared by the
/// client's auto-clear timer and the hub's stale-row sweeper so the two
/// sides agree on when a burst has ended.
pub const TYPING_QUIET_PERIOD_MS: u64 = 3000;

/// One row per profile, overwritten on every keystroke burst, not a log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub profile_id: Uuid,
    pub display_name: String,
    pub typing: bool,
    pub updated_at: DateTime<Utc>,
}
