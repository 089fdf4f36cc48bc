//! Room store implementation
//!
//! The authoritative in-memory registry of rooms: token validity,
//! membership, message history, and tracked media references all live here.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::SessionId;

use super::entry::{MemberSender, RoomEntry};
use super::error::RoomError;
use super::event::{ChatMessage, OutboundEvent};
use super::token::RoomToken;

/// Everything removed from the store when a room is torn down
///
/// Handing the snapshot to the caller is what makes teardown race-safe:
/// [`RoomStore::delete`] returns it to exactly one concurrent caller, so the
/// cleanup side effects run at most once.
pub struct RemovedRoom {
    /// Media references that still need external deletion
    pub media_refs: Vec<String>,
    /// Members that were still connected, for the final notice
    pub members: HashMap<SessionId, MemberSender>,
}

/// Central registry for all active rooms
///
/// Thread-safe via `RwLock`. The outer map lock is held only long enough to
/// look up or insert the per-room entry; per-room mutations serialize behind
/// the entry's own lock, since the room is the unit of contention.
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomToken, Arc<RwLock<RoomEntry>>>>,
}

impl RoomStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new empty room and return its token
    pub async fn create(&self) -> RoomToken {
        let token = RoomToken::generate();
        self.rooms
            .write()
            .await
            .insert(token.clone(), Arc::new(RwLock::new(RoomEntry::new())));

        tracing::info!(room = %token, "Room created");
        token
    }

    /// Whether a token currently names a live room
    ///
    /// This is the only gate for accepting a room-scoped event.
    pub async fn exists(&self, token: &RoomToken) -> bool {
        self.rooms.read().await.contains_key(token)
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    async fn entry(&self, token: &RoomToken) -> Option<Arc<RwLock<RoomEntry>>> {
        self.rooms.read().await.get(token).cloned()
    }

    /// Register a member and return the history snapshot for replay
    pub async fn join(
        &self,
        token: &RoomToken,
        session_id: SessionId,
        sender: MemberSender,
    ) -> Result<Vec<ChatMessage>, RoomError> {
        let entry_arc = self
            .entry(token)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(token.clone()))?;

        let mut entry = entry_arc.write().await;
        entry.add_member(session_id, sender);

        tracing::info!(
            room = %token,
            session_id = session_id,
            members = entry.member_count(),
            "Member joined"
        );

        Ok(entry.history())
    }

    /// Append a message and fan the updated history out to every member
    ///
    /// The push and the sends happen under one entry write lock, so two
    /// concurrent appends cannot deliver their snapshots out of acceptance
    /// order. The sends are unbounded channel pushes and never block the
    /// lock holder.
    pub async fn append_and_broadcast(
        &self,
        token: &RoomToken,
        message: ChatMessage,
    ) -> Result<Vec<ChatMessage>, RoomError> {
        let entry_arc = self
            .entry(token)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(token.clone()))?;

        let mut entry = entry_arc.write().await;
        entry.push_message(message);
        let history = entry.history();
        entry.broadcast(
            &OutboundEvent::ChatMessage {
                messages: history.clone(),
            },
            None,
        );
        Ok(history)
    }

    /// Track an uploaded asset against a room
    ///
    /// Returns whether the reference was tracked. Unknown tokens are a
    /// silent no-op: uploads may race room deletion and must not crash the
    /// uploader.
    pub async fn add_media_ref(&self, token: &RoomToken, media_id: &str) -> bool {
        if let Some(entry_arc) = self.entry(token).await {
            let mut entry = entry_arc.write().await;
            entry.add_media_ref(media_id);
            tracing::debug!(room = %token, media_id = %media_id, "Media reference tracked");
            true
        } else {
            tracing::debug!(
                room = %token,
                media_id = %media_id,
                "Media reference for unknown room dropped"
            );
            false
        }
    }

    /// Remove a member, returning the number of members left
    ///
    /// `None` means the room was already gone.
    pub async fn remove_member(
        &self,
        token: &RoomToken,
        session_id: SessionId,
    ) -> Option<usize> {
        let entry_arc = self.entry(token).await?;

        let mut entry = entry_arc.write().await;
        if entry.remove_member(session_id) {
            tracing::info!(
                room = %token,
                session_id = session_id,
                members = entry.member_count(),
                "Member left"
            );
        }
        Some(entry.member_count())
    }

    /// Send an event to every member of a room, except `except`
    pub async fn broadcast(
        &self,
        token: &RoomToken,
        event: OutboundEvent,
        except: Option<SessionId>,
    ) {
        if let Some(entry_arc) = self.entry(token).await {
            let entry = entry_arc.read().await;
            entry.broadcast(&event, except);
        }
    }

    /// Remove a room, returning its cleanup snapshot
    ///
    /// Idempotent: exactly one concurrent caller observes `Some`, every
    /// other caller (and any call for an unknown token) gets `None`.
    pub async fn delete(&self, token: &RoomToken) -> Option<RemovedRoom> {
        let entry_arc = self.rooms.write().await.remove(token)?;

        // Other tasks may still hold a clone of the entry arc, so the state
        // is swapped out under the entry lock rather than unwrapped.
        let mut entry = entry_arc.write().await;
        let (media_refs, members) = std::mem::replace(&mut *entry, RoomEntry::new()).into_parts();

        tracing::info!(
            room = %token,
            members = members.len(),
            media_refs = media_refs.len(),
            "Room removed from store"
        );

        Some(RemovedRoom {
            media_refs,
            members,
        })
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn member() -> (
        MemberSender,
        mpsc::UnboundedReceiver<OutboundEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_create_and_exists() {
        let store = RoomStore::new();
        let token = store.create().await;

        assert!(store.exists(&token).await);
        assert!(!store.exists(&RoomToken::new("nope")).await);
        assert_eq!(store.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = RoomStore::new();
        let token = store.create().await;

        store
            .append_and_broadcast(&token, ChatMessage::text("Alice", "m1"))
            .await
            .unwrap();
        let history = store
            .append_and_broadcast(&token, ChatMessage::text("Bob", "m2"))
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::text("Alice", "m1"));
        assert_eq!(history[1], ChatMessage::text("Bob", "m2"));
    }

    #[tokio::test]
    async fn test_append_unknown_room() {
        let store = RoomStore::new();
        let result = store
            .append_and_broadcast(&RoomToken::new("ghost"), ChatMessage::text("Alice", "hi"))
            .await;

        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
        assert_eq!(store.room_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_deliver_in_acceptance_order() {
        let store = Arc::new(RoomStore::new());
        let token = store.create().await;
        let (sender, mut events) = member();
        store.join(&token, 1, sender).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append_and_broadcast(&token, ChatMessage::text("Alice", format!("m{}", i)))
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Every delivered snapshot extends the previous one by exactly the
        // message that was appended with it.
        let mut previous: Vec<ChatMessage> = Vec::new();
        while let Ok(event) = events.try_recv() {
            let OutboundEvent::ChatMessage { messages } = event else {
                panic!("expected chat-message event");
            };
            assert_eq!(messages.len(), previous.len() + 1);
            assert_eq!(&messages[..previous.len()], &previous[..]);
            previous = messages;
        }
        assert_eq!(previous.len(), 8);
    }

    #[tokio::test]
    async fn test_join_replays_history() {
        let store = RoomStore::new();
        let token = store.create().await;
        store
            .append_and_broadcast(&token, ChatMessage::text("Alice", "hi"))
            .await
            .unwrap();

        let (sender, _rx) = member();
        let history = store.join(&token, 1, sender).await.unwrap();
        assert_eq!(history, vec![ChatMessage::text("Alice", "hi")]);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let store = RoomStore::new();
        let (sender, _rx) = member();
        let result = store.join(&RoomToken::new("ghost"), 1, sender).await;
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_media_refs_deduplicated() {
        let store = RoomStore::new();
        let token = store.create().await;

        assert!(store.add_media_ref(&token, "m1").await);
        assert!(store.add_media_ref(&token, "m1").await);
        assert!(store.add_media_ref(&token, "m2").await);

        let removed = store.delete(&token).await.unwrap();
        assert_eq!(removed.media_refs, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_media_ref_unknown_room_is_noop() {
        let store = RoomStore::new();
        // Must not panic or create a room.
        assert!(!store.add_media_ref(&RoomToken::new("ghost"), "m1").await);
        assert_eq!(store.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let store = RoomStore::new();
        let token = store.create().await;

        assert!(store.delete(&token).await.is_some());
        assert!(store.delete(&token).await.is_none());
        assert!(!store.exists(&token).await);
    }

    #[tokio::test]
    async fn test_broadcast_except_sender() {
        let store = RoomStore::new();
        let token = store.create().await;

        let (alice_tx, mut alice_rx) = member();
        let (bob_tx, mut bob_rx) = member();
        store.join(&token, 1, alice_tx).await.unwrap();
        store.join(&token, 2, bob_tx).await.unwrap();

        store
            .broadcast(&token, OutboundEvent::RoomDeleted, Some(1))
            .await;

        assert_eq!(bob_rx.try_recv().unwrap(), OutboundEvent::RoomDeleted);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_member_counts() {
        let store = RoomStore::new();
        let token = store.create().await;

        let (alice_tx, _a) = member();
        let (bob_tx, _b) = member();
        store.join(&token, 1, alice_tx).await.unwrap();
        store.join(&token, 2, bob_tx).await.unwrap();

        assert_eq!(store.remove_member(&token, 1).await, Some(1));
        assert_eq!(store.remove_member(&token, 2).await, Some(0));
        assert_eq!(store.remove_member(&RoomToken::new("ghost"), 2).await, None);
    }
}
