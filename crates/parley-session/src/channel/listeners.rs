//! Handler registry shared by channel implementations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Handler, ListenerId};

struct Entry {
    id: ListenerId,
    event: String,
    handler: Handler,
}

/// Ordered list of event handlers.
///
/// Dispatch snapshots the matching handlers and calls them with the lock
/// released, so a handler may register or remove listeners (or disconnect
/// the channel) without deadlocking.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, event: &str, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push(Entry {
            id,
            event: event.to_string(),
            handler,
        });
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    pub fn count(&self, event: &str) -> usize {
        self.entries().iter().filter(|e| e.event == event).count()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Call every handler registered for `event`, in registration order.
    /// Returns how many handlers ran.
    pub fn dispatch(&self, event: &str, payload: &serde_json::Value) -> usize {
        let handlers: Vec<Handler> = self
            .entries()
            .iter()
            .filter(|e| e.event == event)
            .map(|e| e.handler.clone())
            .collect();

        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }
}
