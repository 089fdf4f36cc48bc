//! Room entry
//!
//! Per-room state stored in the registry: the ordered message history,
//! tracked media references, and the outbound channels of joined members.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::session::SessionId;

use super::event::{ChatMessage, OutboundEvent};

/// Per-member sender for outbound events
///
/// Unbounded so fan-out never blocks event processing; the connection's
/// writer task drains it onto the socket.
pub type MemberSender = mpsc::UnboundedSender<OutboundEvent>;

/// State of a single room
pub struct RoomEntry {
    /// Ordered message history; insertion order is delivery order
    messages: Vec<ChatMessage>,

    /// Identifiers of uploaded assets to release at teardown
    media_refs: Vec<String>,

    /// Active members keyed by session ID
    members: HashMap<SessionId, MemberSender>,
}

impl RoomEntry {
    pub(super) fn new() -> Self {
        Self {
            messages: Vec::new(),
            media_refs: Vec::new(),
            members: HashMap::new(),
        }
    }

    /// Number of joined members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Snapshot of the ordered message history
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub(super) fn add_member(&mut self, session_id: SessionId, sender: MemberSender) {
        self.members.insert(session_id, sender);
    }

    pub(super) fn remove_member(&mut self, session_id: SessionId) -> bool {
        self.members.remove(&session_id).is_some()
    }

    pub(super) fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub(super) fn add_media_ref(&mut self, media_id: &str) {
        // Set semantics: re-announcing an upload must not double the
        // deletion attempts at teardown.
        if !self.media_refs.iter().any(|id| id == media_id) {
            self.media_refs.push(media_id.to_string());
        }
    }

    /// Send an event to every member except `except`
    ///
    /// Send failures mean the member's writer task is gone; the disconnect
    /// path removes the member, so they are ignored here.
    pub(super) fn broadcast(&self, event: &OutboundEvent, except: Option<SessionId>) {
        for (session_id, sender) in &self.members {
            if Some(*session_id) == except {
                continue;
            }
            let _ = sender.send(event.clone());
        }
    }

    pub(super) fn into_parts(self) -> (Vec<String>, HashMap<SessionId, MemberSender>) {
        (self.media_refs, self.members)
    }
}
