use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the caller-supplied farmer identifier on REST calls.
pub const FARMER_ID_HEADER: &str = "x-farmer-id";

/// Hard cap applied to message text at the single write boundary.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// The one validation point for message text. Both posting paths call
/// this (the client before it sends, the hub when it receives), so the
/// two can never disagree about what a valid message is.
pub fn validate_content(content: &str) -> Result<(), ContentError> {
    if content.trim().is_empty() {
        return Err(ContentError::Empty);
    }
    let chars = content.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ContentError::TooLong(chars));
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("message content is empty")]
    Empty,
    #[error("message content is {0} characters, max is {MAX_MESSAGE_CHARS}")]
    TooLong(usize),
}

// -- Profiles --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsureProfileRequest {
    pub farmer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceRequest {
    pub online: bool,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendMessageRequest {
    Text {
        content: String,
        reply_to: Option<Uuid>,
    },
    Voice {
        voice_url: String,
        voice_duration_secs: f64,
        reply_to: Option<Uuid>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

// -- Typing --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypingRequest {
    pub typing: bool,
}

// -- Voice uploads --

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceUploadResponse {
    /// Hub-relative URL the stored object is served from.
    pub url: String,
    /// SHA-256 of the stored bytes, hex-encoded.
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_content() {
        assert_eq!(validate_content(""), Err(ContentError::Empty));
        assert_eq!(validate_content("   \n\t"), Err(ContentError::Empty));
    }

    #[test]
    fn caps_content_at_limit() {
        let at_limit: String = "x".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(validate_content(&at_limit), Ok(()));

        let over: String = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_content(&over),
            Err(ContentError::TooLong(MAX_MESSAGE_CHARS + 1))
        );
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        // 2000 multibyte chars is exactly at the limit even though the
        // byte length is far larger.
        let s: String = "क".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(validate_content(&s), Ok(()));
    }
}
