//! Wire event types
//!
//! JSON events exchanged with clients over the WebSocket connection, plus
//! the message record stored in room history. Inbound and outbound events
//! are externally tagged with a kebab-case `type` field.

use serde::{Deserialize, Serialize};

/// Payload of a chat message: plain text or a reference to uploaded media
///
/// Serialized untagged: a bare JSON string is text, an object with
/// `mediaId`/`url` is a media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    /// Reference to a previously uploaded asset
    #[serde(rename_all = "camelCase")]
    Media { media_id: String, url: String },
    /// Plain text message
    Text(String),
}

/// A message stored in a room's history
///
/// The author name is resolved from the sender's session at write time and
/// never re-resolved, so a later rename does not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the sender at the time the message was accepted
    pub author: String,
    /// Message content
    pub payload: MessagePayload,
}

impl ChatMessage {
    /// Create a text message
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            payload: MessagePayload::Text(text.into()),
        }
    }

    /// Create a media-reference message
    pub fn media(
        author: impl Into<String>,
        media_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            payload: MessagePayload::Media {
                media_id: media_id.into(),
                url: url.into(),
            },
        }
    }
}

/// Event sent from a client to the server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// Join a room under a display name
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String, name: String },
    /// Send a chat message to the joined room
    ChatMessage { payload: MessagePayload },
    /// Associate a previously uploaded asset with the joined room
    #[serde(rename_all = "camelCase")]
    MediaUploaded { media_id: String },
}

/// Event sent from the server to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Full history replay, delivered to a joiner exactly once
    ChatHistory { messages: Vec<ChatMessage> },
    /// Another participant joined the room
    #[serde(rename_all = "camelCase")]
    UserJoined { user_name: String, message: String },
    /// A participant left the room
    #[serde(rename_all = "camelCase")]
    UserLeft { user_name: String, message: String },
    /// Full updated history, broadcast to the whole room on every message
    ChatMessage { messages: Vec<ChatMessage> },
    /// The room was torn down
    RoomDeleted,
    /// Request-scoped error, only ever sent to the originating client
    Error { message: String },
}
