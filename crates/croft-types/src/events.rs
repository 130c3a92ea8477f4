use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, FarmerProfile, TypingIndicator};

/// The three logical change feeds a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Messages,
    Presence,
    Typing,
}

/// Events sent over the WebSocket feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Hub confirms the identify handshake.
    Ready { profile: FarmerProfile },

    /// A new message was posted
    MessageCreate { message: ChatMessage },

    /// A message was edited
    MessageUpdate { message: ChatMessage },

    /// A message was deleted
    MessageDelete { message_id: Uuid },

    /// A farmer's typing indicator changed
    TypingUpdate { indicator: TypingIndicator },

    /// A farmer came online, went offline, or refreshed last-seen
    PresenceUpdate { profile: FarmerProfile },
}

impl FeedEvent {
    /// Returns the feed this event belongs to. `Ready` is connection-scoped
    /// and delivered regardless of subscriptions.
    pub fn feed(&self) -> Option<Feed> {
        match self {
            Self::Ready { .. } => None,
            Self::MessageCreate { .. } | Self::MessageUpdate { .. } | Self::MessageDelete { .. } => {
                Some(Feed::Messages)
            }
            Self::TypingUpdate { .. } => Some(Feed::Typing),
            Self::PresenceUpdate { .. } => Some(Feed::Presence),
        }
    }
}

/// Commands sent FROM client TO hub over the WebSocket feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedCommand {
    /// Bind this connection to a farmer identity
    Identify { farmer_id: String },

    /// Replace this connection's feed subscriptions.
    /// The hub only forwards feed-scoped events the client subscribed to.
    Subscribe { feeds: Vec<Feed> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_events_are_message_feed_scoped() {
        let ev = FeedEvent::MessageDelete {
            message_id: Uuid::new_v4(),
        };
        assert_eq!(ev.feed(), Some(Feed::Messages));
    }

    #[test]
    fn commands_use_tagged_wire_format() {
        let cmd = FeedCommand::Subscribe {
            feeds: vec![Feed::Messages, Feed::Typing],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "Subscribe");
        assert_eq!(json["data"]["feeds"][1], "typing");
    }
}
