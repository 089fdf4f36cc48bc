//! Broadcast coordinator
//!
//! Routes inbound events from connected participants to the right room and
//! keeps the room store, session directory, and inactivity timers in sync.
//! All room mutations flow through the handlers here; no other component
//! writes room state directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::room::{
    ChatMessage, MemberSender, MessagePayload, OutboundEvent, RoomError, RoomStore, RoomToken,
};
use crate::session::{SessionDirectory, SessionId};
use crate::storage::ObjectStorage;
use crate::timer::{TimerManager, DEFAULT_INACTIVITY_TIMEOUT};

/// Relay policy configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long a room survives without qualifying activity
    pub inactivity_timeout: Duration,

    /// Tear a room down as soon as its last member disconnects, instead of
    /// leaving it to expire via the inactivity timer
    pub teardown_on_empty: bool,

    /// Whether a media-upload notice counts as qualifying activity
    pub reset_timer_on_media: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            teardown_on_empty: true,
            reset_timer_on_media: false,
        }
    }
}

impl RelayConfig {
    /// Set the inactivity timeout
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set whether the last disconnect tears the room down immediately
    pub fn teardown_on_empty(mut self, enabled: bool) -> Self {
        self.teardown_on_empty = enabled;
        self
    }

    /// Set whether media notices reset the inactivity timer
    pub fn reset_timer_on_media(mut self, enabled: bool) -> Self {
        self.reset_timer_on_media = enabled;
        self
    }
}

/// Coordinator over the room store, session directory, and timers
///
/// State is injected at construction and owned here, never ambient: tests
/// run isolated instances side by side.
pub struct Coordinator<S: ObjectStorage> {
    store: RoomStore,
    sessions: SessionDirectory,
    timers: TimerManager,
    storage: S,
    config: RelayConfig,
}

impl<S: ObjectStorage> Coordinator<S> {
    /// Create a coordinator and the receiver of its timer-expiry events
    ///
    /// The receiver must be handed to [`Coordinator::spawn_expiry_task`]
    /// for time-based teardown to take effect.
    pub fn new(storage: S, config: RelayConfig) -> (Self, mpsc::UnboundedReceiver<RoomToken>) {
        let (timers, expired_rx) = TimerManager::new();
        let coordinator = Self {
            store: RoomStore::new(),
            sessions: SessionDirectory::new(),
            timers,
            storage,
            config,
        };
        (coordinator, expired_rx)
    }

    /// The room store
    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// The session directory
    pub fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    /// The timer manager
    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    /// The object storage collaborator
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Spawn the task that turns timer expiries into teardowns
    ///
    /// Expiry re-enters the coordinator as an internal event with the same
    /// authority as a client event, so time-based and explicit teardown
    /// share one code path.
    pub fn spawn_expiry_task(
        self: &Arc<Self>,
        mut expired_rx: mpsc::UnboundedReceiver<RoomToken>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(token) = expired_rx.recv().await {
                tracing::info!(room = %token, "Room expired");
                coordinator.teardown(&token).await;
            }
        })
    }

    /// Create a room and arm its inactivity timer
    pub async fn create_room(&self) -> RoomToken {
        let token = self.store.create().await;
        self.timers
            .arm_or_reset(token.clone(), self.config.inactivity_timeout);
        token
    }

    /// Handle a join request
    ///
    /// On an unknown token the requester gets an error event and nothing is
    /// mutated. Otherwise the session is registered, the timer reset, the
    /// other members notified, and the full history replayed to the joiner
    /// exactly once, in original order.
    ///
    /// Returns whether the join succeeded.
    pub async fn join(
        &self,
        token: &RoomToken,
        name: String,
        session_id: SessionId,
        sender: MemberSender,
    ) -> bool {
        let history = match self.store.join(token, session_id, sender.clone()).await {
            Ok(history) => history,
            Err(RoomError::RoomNotFound(_)) => {
                tracing::warn!(room = %token, session_id = session_id, "Join rejected: unknown room");
                let _ = sender.send(OutboundEvent::Error {
                    message: "Room not found.".to_string(),
                });
                return false;
            }
        };

        self.sessions.register(session_id, name.clone()).await;
        self.timers
            .arm_or_reset(token.clone(), self.config.inactivity_timeout);

        // The joined notice goes out before anything this member says can
        // be broadcast, so recipients never see an unannounced author.
        self.store
            .broadcast(
                token,
                OutboundEvent::UserJoined {
                    user_name: name.clone(),
                    message: format!("{} has joined the room.", name),
                },
                Some(session_id),
            )
            .await;

        let _ = sender.send(OutboundEvent::ChatHistory { messages: history });
        true
    }

    /// Handle a chat message from a joined participant
    ///
    /// The author name is resolved once, at write time. Append and fan-out
    /// are a single store operation, so deliveries cannot reorder across
    /// concurrent messages. If the room vanished concurrently the event is
    /// dropped without erroring the sender.
    pub async fn message(&self, token: &RoomToken, session_id: SessionId, payload: MessagePayload) {
        let author = self.sessions.resolve_or_anonymous(session_id).await;
        let message = ChatMessage { author, payload };

        match self.store.append_and_broadcast(token, message).await {
            Ok(_) => {
                self.timers
                    .arm_or_reset(token.clone(), self.config.inactivity_timeout);
            }
            Err(RoomError::RoomNotFound(_)) => {
                tracing::debug!(room = %token, "Message for vanished room dropped");
            }
        }
    }

    /// Handle a media-upload notice
    ///
    /// Best-effort bookkeeping; never errors the caller even if the room is
    /// already gone. The timer is only re-armed when the reference was
    /// actually tracked, so a notice racing teardown cannot leave a timer
    /// behind for a deleted room.
    pub async fn media_attached(&self, token: &RoomToken, media_id: &str) {
        let tracked = self.store.add_media_ref(token, media_id).await;
        if tracked && self.config.reset_timer_on_media {
            self.timers
                .arm_or_reset(token.clone(), self.config.inactivity_timeout);
        }
    }

    /// Handle a participant disconnect
    ///
    /// The session entry is removed unconditionally. An emptied room is
    /// torn down immediately or left for its timer, per configuration.
    pub async fn disconnect(&self, token: &RoomToken, session_id: SessionId) {
        let name = self.sessions.remove(session_id).await;

        match self.store.remove_member(token, session_id).await {
            Some(0) => {
                if self.config.teardown_on_empty {
                    self.teardown(token).await;
                }
            }
            Some(_) => {
                let name = name.unwrap_or_else(|| crate::session::ANONYMOUS.to_string());
                self.store
                    .broadcast(
                        token,
                        OutboundEvent::UserLeft {
                            user_name: name.clone(),
                            message: format!("{} has left the room.", name),
                        },
                        None,
                    )
                    .await;
            }
            // Room already torn down concurrently; nothing left to do.
            None => {}
        }
    }

    /// Tear a room down
    ///
    /// Shared by the timer-fire and empty-room paths. De-duplicated through
    /// the store: only the caller that actually removes the room runs the
    /// side effects, so a teardown race cleans up exactly once. Individual
    /// media deletion failures are logged and never abort the loop.
    pub async fn teardown(&self, token: &RoomToken) {
        let Some(removed) = self.store.delete(token).await else {
            return;
        };

        self.timers.cancel(token);

        for sender in removed.members.values() {
            let _ = sender.send(OutboundEvent::RoomDeleted);
        }

        for media_id in &removed.media_refs {
            if let Err(e) = self.storage.delete(media_id).await {
                tracing::warn!(
                    room = %token,
                    media_id = %media_id,
                    error = %e,
                    "Media cleanup failed"
                );
            }
        }

        tracing::info!(
            room = %token,
            media_refs = removed.media_refs.len(),
            "Room torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::timeout;

    use crate::storage::MockStorage;

    use super::*;

    fn coordinator(config: RelayConfig) -> (Arc<Coordinator<MockStorage>>, UnboundedReceiver<RoomToken>) {
        let (coordinator, expired_rx) = Coordinator::new(MockStorage::new(), config);
        (Arc::new(coordinator), expired_rx)
    }

    fn member() -> (MemberSender, UnboundedReceiver<OutboundEvent>) {
        mpsc::unbounded_channel()
    }

    fn history_texts(event: OutboundEvent) -> Vec<(String, String)> {
        let (OutboundEvent::ChatMessage { messages } | OutboundEvent::ChatHistory { messages }) =
            event
        else {
            panic!("expected history-carrying event");
        };
        messages
            .into_iter()
            .map(|m| match m.payload {
                MessagePayload::Text(text) => (m.author, text),
                MessagePayload::Media { url, .. } => (m.author, url),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_join_unknown_room_errors_requester_only() {
        let (coordinator, _rx) = coordinator(RelayConfig::default());
        let (sender, mut events) = member();

        let joined = coordinator
            .join(&RoomToken::new("ghost"), "Alice".into(), 1, sender)
            .await;

        assert!(!joined);
        assert!(matches!(
            events.try_recv().unwrap(),
            OutboundEvent::Error { .. }
        ));
        assert!(events.try_recv().is_err());
        // No state was touched.
        assert_eq!(coordinator.store().room_count().await, 0);
        assert!(coordinator.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_alice_and_bob_scenario() {
        let (coordinator, _rx) = coordinator(RelayConfig::default());
        let token = coordinator.create_room().await;

        let (alice_tx, mut alice) = member();
        let (bob_tx, mut bob) = member();

        assert!(coordinator.join(&token, "Alice".into(), 1, alice_tx).await);
        assert_eq!(
            alice.try_recv().unwrap(),
            OutboundEvent::ChatHistory { messages: vec![] }
        );

        assert!(coordinator.join(&token, "Bob".into(), 2, bob_tx).await);
        assert_eq!(
            alice.try_recv().unwrap(),
            OutboundEvent::UserJoined {
                user_name: "Bob".into(),
                message: "Bob has joined the room.".into(),
            }
        );
        assert_eq!(
            bob.try_recv().unwrap(),
            OutboundEvent::ChatHistory { messages: vec![] }
        );

        coordinator
            .message(&token, 1, MessagePayload::Text("hi".into()))
            .await;
        coordinator
            .message(&token, 2, MessagePayload::Text("hello".into()))
            .await;

        let expected = vec![
            ("Alice".to_string(), "hi".to_string()),
            ("Bob".to_string(), "hello".to_string()),
        ];
        assert_eq!(history_texts(alice.try_recv().unwrap()), &expected[..1]);
        assert_eq!(history_texts(alice.try_recv().unwrap()), expected);
        assert_eq!(history_texts(bob.try_recv().unwrap()), &expected[..1]);
        assert_eq!(history_texts(bob.try_recv().unwrap()), expected);

        // A late joiner replays the same ordered history.
        let (carol_tx, mut carol) = member();
        assert!(coordinator.join(&token, "Carol".into(), 3, carol_tx).await);
        assert_eq!(history_texts(carol.try_recv().unwrap()), expected);
        coordinator.disconnect(&token, 3).await;
        let _ = alice.try_recv(); // Carol joined
        let _ = alice.try_recv(); // Carol left
        let _ = bob.try_recv();
        let _ = bob.try_recv();

        coordinator.disconnect(&token, 2).await;
        assert_eq!(
            alice.try_recv().unwrap(),
            OutboundEvent::UserLeft {
                user_name: "Bob".into(),
                message: "Bob has left the room.".into(),
            }
        );
        assert!(coordinator.sessions().resolve(2).await.is_none());

        // Last member out: room torn down immediately (teardown_on_empty).
        coordinator.disconnect(&token, 1).await;
        assert!(!coordinator.store().exists(&token).await);
        assert!(coordinator.sessions().is_empty().await);
        assert!(coordinator.storage().delete_attempts().is_empty());
        assert!(!coordinator.timers().is_armed(&token));
    }

    #[tokio::test]
    async fn test_message_author_falls_back_to_anonymous() {
        let (coordinator, _rx) = coordinator(RelayConfig::default());
        let token = coordinator.create_room().await;

        let (alice_tx, mut alice) = member();
        assert!(coordinator.join(&token, "Alice".into(), 1, alice_tx).await);
        let _ = alice.try_recv(); // history

        // Session 99 never joined; delivery must still happen.
        coordinator
            .message(&token, 99, MessagePayload::Text("hi".into()))
            .await;

        assert_eq!(
            history_texts(alice.try_recv().unwrap()),
            vec![("Anonymous".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn test_message_for_vanished_room_dropped() {
        let (coordinator, _rx) = coordinator(RelayConfig::default());
        let token = coordinator.create_room().await;
        coordinator.teardown(&token).await;

        // Must not panic or surface an error anywhere.
        coordinator
            .message(&token, 1, MessagePayload::Text("hi".into()))
            .await;
        assert_eq!(coordinator.store().room_count().await, 0);
    }

    #[tokio::test]
    async fn test_media_cleanup_tolerates_partial_failure() {
        let (coordinator, _rx) = coordinator(RelayConfig::default());
        let token = coordinator.create_room().await;

        coordinator.media_attached(&token, "a").await;
        coordinator.media_attached(&token, "b").await;
        coordinator.media_attached(&token, "c").await;
        coordinator.storage().fail_delete_of("b");

        coordinator.teardown(&token).await;

        // b failing aborts neither a nor c, nor store removal.
        assert_eq!(coordinator.storage().delete_attempts(), vec!["a", "b", "c"]);
        assert!(!coordinator.store().exists(&token).await);
    }

    #[tokio::test]
    async fn test_teardown_idempotent_under_race() {
        let (coordinator, _rx) = coordinator(RelayConfig::default());
        let token = coordinator.create_room().await;

        let (alice_tx, mut alice) = member();
        assert!(coordinator.join(&token, "Alice".into(), 1, alice_tx).await);
        let _ = alice.try_recv(); // history
        coordinator.media_attached(&token, "a").await;
        coordinator.media_attached(&token, "b").await;

        tokio::join!(coordinator.teardown(&token), coordinator.teardown(&token));

        // Exactly one notice and one deletion attempt per reference.
        assert_eq!(alice.try_recv().unwrap(), OutboundEvent::RoomDeleted);
        assert!(alice.try_recv().is_err());
        assert_eq!(coordinator.storage().delete_attempts(), vec!["a", "b"]);
        assert!(!coordinator.store().exists(&token).await);
    }

    #[tokio::test]
    async fn test_unjoined_room_expires_via_timer() {
        let config = RelayConfig::default().inactivity_timeout(Duration::from_millis(20));
        let (coordinator, expired_rx) = coordinator(config);
        let _expiry_task = coordinator.spawn_expiry_task(expired_rx);

        let token = coordinator.create_room().await;
        assert!(coordinator.store().exists(&token).await);

        timeout(Duration::from_secs(2), async {
            while coordinator.store().exists(&token).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("room never expired");

        // No media was tracked, so no cleanup calls were made.
        assert!(coordinator.storage().delete_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_room_left_for_timer_when_configured() {
        let config = RelayConfig::default()
            .teardown_on_empty(false)
            .inactivity_timeout(Duration::from_millis(30));
        let (coordinator, expired_rx) = coordinator(config);
        let _expiry_task = coordinator.spawn_expiry_task(expired_rx);

        let token = coordinator.create_room().await;
        let (alice_tx, _alice) = member();
        assert!(coordinator.join(&token, "Alice".into(), 1, alice_tx).await);
        coordinator.disconnect(&token, 1).await;

        // Still alive right after the last disconnect.
        assert!(coordinator.store().exists(&token).await);

        timeout(Duration::from_secs(2), async {
            while coordinator.store().exists(&token).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("empty room never expired");
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_notice_does_not_reset_timer_by_default() {
        let config = RelayConfig::default().inactivity_timeout(Duration::from_millis(50));
        let (coordinator, expired_rx) = coordinator(config);
        let _expiry_task = coordinator.spawn_expiry_task(expired_rx);

        let token = coordinator.create_room().await;
        for i in 0..5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator.media_attached(&token, &format!("m{}", i)).await;
        }

        // 100ms of nothing but media notices: the room still expired.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!coordinator.store().exists(&token).await);
        // Cleanup ran for the refs that were tracked before expiry.
        assert!(!coordinator.storage().delete_attempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_notice_resets_timer_when_configured() {
        let config = RelayConfig::default()
            .inactivity_timeout(Duration::from_millis(50))
            .reset_timer_on_media(true);
        let (coordinator, expired_rx) = coordinator(config);
        let _expiry_task = coordinator.spawn_expiry_task(expired_rx);

        let token = coordinator.create_room().await;
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            coordinator.media_attached(&token, "m").await;
        }

        // 200ms in, but never 50ms of silence: still alive.
        assert!(coordinator.store().exists(&token).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!coordinator.store().exists(&token).await);
    }

    #[tokio::test]
    async fn test_media_notice_for_vanished_room_leaves_no_timer() {
        let config = RelayConfig::default().reset_timer_on_media(true);
        let (coordinator, _rx) = coordinator(config);
        let token = coordinator.create_room().await;
        coordinator.teardown(&token).await;

        coordinator.media_attached(&token, "m1").await;

        assert!(!coordinator.timers().is_armed(&token));
        assert!(!coordinator.store().exists(&token).await);
    }

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.inactivity_timeout, DEFAULT_INACTIVITY_TIMEOUT);
        assert!(config.teardown_on_empty);
        assert!(!config.reset_timer_on_media);
    }

    #[test]
    fn test_relay_config_builder() {
        let config = RelayConfig::default()
            .inactivity_timeout(Duration::from_secs(60))
            .teardown_on_empty(false)
            .reset_timer_on_media(true);

        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
        assert!(!config.teardown_on_empty);
        assert!(config.reset_timer_on_media);
    }
}
