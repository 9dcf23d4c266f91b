// Per-match serialization slots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily created async mutex per `(day, match id)`. Holding a slot's guard
/// serializes every event for that match; slots are dropped once the match is
/// terminal.
#[derive(Default)]
pub struct MatchLocks {
    slots: Mutex<HashMap<(u32, String), Arc<AsyncMutex<()>>>>,
}

impl MatchLocks {
    /// Wait for exclusive access to `match_id` of `day`.
    pub async fn acquire(&self, day: u32, match_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().expect("match lock table poisoned");
            Arc::clone(slots.entry((day, match_id.to_string())).or_default())
        };
        slot.lock_owned().await
    }

    /// Forget the slot for a terminal match. Events already waiting on it still
    /// run and find the match closed.
    pub fn release(&self, day: u32, match_id: &str) {
        self.slots
            .lock()
            .expect("match lock table poisoned")
            .remove(&(day, match_id.to_string()));
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("match lock table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
