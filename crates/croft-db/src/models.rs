//! Database row types that map directly to SQLite rows.
//! Distinct from the croft-types API models to keep the DB layer independent;
//! `into_*` converters parse the stored strings back into typed form.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use croft_types::models::{ChatMessage, FarmerProfile, MessageKind, TypingIndicator};

/// Timestamp written on every insert/update. Fixed microsecond precision so
/// lexicographic order on the stored TEXT matches chronological order.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Falls back to SQLite's own
/// `datetime('now')` format ("YYYY-MM-DD HH:MM:SS", no timezone) for rows
/// written by column defaults.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("unparseable timestamp: {s}"))
}

pub struct ProfileRow {
    pub id: String,
    pub farmer_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub online: bool,
    pub last_seen: String,
    pub created_at: String,
}

impl ProfileRow {
    pub fn into_profile(self) -> Result<FarmerProfile> {
        Ok(FarmerProfile {
            id: self.id.parse().with_context(|| format!("corrupt profile id: {}", self.id))?,
            farmer_id: self.farmer_id,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            online: self.online,
            last_seen: parse_ts(&self.last_seen)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub profile_id: String,
    pub author_name: String,
    pub kind: String,
    pub content: Option<String>,
    pub voice_url: Option<String>,
    pub voice_duration_secs: Option<f64>,
    pub reply_to: Option<String>,
    pub edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<ChatMessage> {
        let kind: MessageKind = self.kind.parse()?;
        Ok(ChatMessage {
            id: self.id.parse().with_context(|| format!("corrupt message id: {}", self.id))?,
            profile_id: self
                .profile_id
                .parse()
                .with_context(|| format!("corrupt profile_id on message {}", self.id))?,
            author_name: self.author_name,
            kind,
            content: self.content,
            voice_url: self.voice_url,
            voice_duration_secs: self.voice_duration_secs,
            reply_to: self.reply_to.map(|r| r.parse()).transpose()?,
            edited: self.edited,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct TypingRow {
    pub profile_id: String,
    pub display_name: String,
    pub typing: bool,
    pub updated_at: String,
}

impl TypingRow {
    pub fn into_indicator(self) -> Result<TypingIndicator> {
        Ok(TypingIndicator {
            profile_id: self.profile_id.parse()?,
            display_name: self.display_name,
            typing: self.typing,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}
