use uuid::Uuid;

use croft_types::models::{ChatMessage, FarmerProfile, TypingIndicator};

/// Session events delivered on the service's broadcast stream.
///
/// `ConnectionState(true)` is emitted exactly once per established session,
/// before any other event of that session.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    ConnectionState(bool),
    NewMessage(ChatMessage),
    MessageUpdated(ChatMessage),
    MessageDeleted(Uuid),
    TypingChanged(TypingIndicator),
    OnlineStatusChanged(FarmerProfile),
    Error(String),
}
