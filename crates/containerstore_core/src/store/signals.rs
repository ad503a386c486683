//! Advisory notifications emitted by a container store.
//!
//! # Responsibility
//! - Fan `Changed` / `StorageError` events out to subscribers.
//! - Mirror storage errors into the log.
//!
//! # Invariants
//! - Emitting never blocks and never fails; dropped receivers are pruned.
//! - Events carry no record contents.

use log::error;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Event delivered to store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A mutating operation completed.
    Changed,
    /// A backing-store operation failed; the message is for humans.
    StorageError(String),
}

/// Shared subscriber list for one store.
///
/// Create one up front and pass it to `ContainerStore::with_signals` to
/// observe errors raised while the store is being constructed.
#[derive(Debug, Clone, Default)]
pub struct StoreSignals {
    subscribers: Arc<Mutex<Vec<Sender<StoreEvent>>>>,
}

impl StoreSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub(crate) fn changed(&self) {
        self.broadcast(StoreEvent::Changed);
    }

    pub(crate) fn storage_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("event=storage_error module=store status=error error={message}");
        self.broadcast(StoreEvent::StorageError(message));
    }

    fn broadcast(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
