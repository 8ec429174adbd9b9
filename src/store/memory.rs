//! In-process store: a mutex-serialized keyspace plus a broadcast channel.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::trace;

use super::keyspace::{Keyspace, Transaction};
use super::{Channel, Store};
use crate::error::Result;

const NOTIFICATION_CAPACITY: usize = 4096;

/// Store held entirely in memory.
///
/// Every transaction runs under one lock, which makes the schedule of
/// transactions serial. Notifications go through a bounded broadcast
/// channel; a subscriber that falls behind loses messages and is told so
/// via `RecvError::Lagged`.
pub struct MemoryStore {
    space: Mutex<Keyspace>,
    notifier: broadcast::Sender<Channel>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY)
    }

    /// Create a store whose notification buffer holds `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        let (notifier, _) = broadcast::channel(capacity.max(1));
        Self {
            space: Mutex::new(Keyspace::new()),
            notifier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        // A panicking script has already been rolled back by the journal.
        self.space.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sorted list of every key currently present.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys()
    }

    /// Drop every key. Counters included.
    pub fn flush(&self) {
        *self.lock() = Keyspace::new();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn atomically<R, F>(&self, script: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R>,
    {
        let published = {
            let mut space = self.lock();
            let mut tx = Transaction::new(&mut space);
            let result = script(&mut tx)?;
            (result, tx.commit())
        };
        let (result, channels) = published;
        for channel in channels {
            trace!(%channel, "publish");
            // No subscribers is not an error: delivery is best-effort.
            let _ = self.notifier.send(channel);
        }
        Ok(result)
    }

    fn subscribe(&self) -> broadcast::Receiver<Channel> {
        self.notifier.subscribe()
    }
}
