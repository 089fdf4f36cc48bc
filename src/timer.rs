//! Per-room inactivity timers
//!
//! One cancellable deadline per room token. Expiry does not touch room
//! state directly: it emits the token on a channel that re-enters the
//! coordinator as an internal event, preserving the single-writer model.
//!
//! Firing, reset, and cancellation are mutually exclusive: a timer task only
//! counts as fired if its generation still matches the slot in the map,
//! checked under the map lock. A cancel or reset that wins the lock first
//! guarantees the stale task is never observed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::room::RoomToken;

/// Default inactivity duration before a room is torn down
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

struct TimerSlot {
    generation: u64,
    task: JoinHandle<()>,
}

/// Manager of per-room inactivity timers
///
/// Owns timer handles keyed by room token but no room data; on expiry it
/// only signals the coordinator to tear the room down.
pub struct TimerManager {
    timers: Arc<Mutex<HashMap<RoomToken, TimerSlot>>>,
    next_generation: AtomicU64,
    expired_tx: mpsc::UnboundedSender<RoomToken>,
}

impl TimerManager {
    /// Create a manager and the receiving end of its expiry channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RoomToken>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let manager = Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            expired_tx,
        };
        (manager, expired_rx)
    }

    /// Arm the timer for a room, cancelling any existing one
    ///
    /// Any qualifying activity resets the deadline through this method, so
    /// a room is torn down only after `duration` of full silence.
    pub fn arm_or_reset(&self, token: RoomToken, duration: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let expired_tx = self.expired_tx.clone();
        let task_token = token.clone();

        // Lock before spawning so the task cannot observe the map without
        // its own slot present, even with a zero duration.
        let mut slots = self.timers.lock().expect("timer map lock poisoned");

        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            let fired = {
                let mut slots = timers.lock().expect("timer map lock poisoned");
                match slots.get(&task_token) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&task_token);
                        true
                    }
                    // A reset or cancel got in first; this firing is stale.
                    _ => false,
                }
            };

            if fired {
                tracing::debug!(room = %task_token, "Inactivity timer fired");
                let _ = expired_tx.send(task_token);
            }
        });

        if let Some(previous) = slots.insert(token, TimerSlot { generation, task }) {
            previous.task.abort();
        }
    }

    /// Cancel and forget the timer for a room
    ///
    /// Called by every path that deletes a room explicitly; no expiry for
    /// the token is observable afterwards.
    pub fn cancel(&self, token: &RoomToken) {
        let removed = {
            let mut slots = self.timers.lock().expect("timer map lock poisoned");
            slots.remove(token)
        };
        if let Some(slot) = removed {
            slot.task.abort();
        }
    }

    /// Whether a timer is currently armed for the token
    pub fn is_armed(&self, token: &RoomToken) -> bool {
        self.timers
            .lock()
            .expect("timer map lock poisoned")
            .contains_key(token)
    }
}
