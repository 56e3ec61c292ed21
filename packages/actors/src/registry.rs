//! Registry of the queues opened by a [`QueueSystem`](crate::QueueSystem).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use ractor::ActorRef;

use crate::handle::QueueHandle;
use crate::messages::LifecycleMessage;

struct Entry {
    handle: QueueHandle,
    lifecycle: Option<ActorRef<LifecycleMessage>>,
    /// A manager is being started for this queue.
    reserved: bool,
}

/// Queue handles and lifecycle managers by queue name.
///
/// Owned by a single system rather than shared globally, so isolated systems
/// can live side by side.
#[derive(Default)]
pub struct QueueRegistry {
    queues: RwLock<HashMap<String, Entry>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue. Returns false if the name is taken.
    pub fn register_queue(&self, handle: QueueHandle) -> bool {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        if queues.contains_key(handle.name()) {
            return false;
        }
        queues.insert(
            handle.name().to_string(),
            Entry {
                handle,
                lifecycle: None,
                reserved: false,
            },
        );
        true
    }

    /// Claim the lifecycle slot of a registered queue.
    ///
    /// Returns false if the queue is unknown, already has a manager or
    /// another caller holds the claim.
    pub fn reserve_lifecycle(&self, name: &str) -> bool {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        match queues.get_mut(name) {
            Some(entry) if entry.lifecycle.is_none() && !entry.reserved => {
                entry.reserved = true;
                true
            }
            _ => false,
        }
    }

    /// Give up a claim taken with [`reserve_lifecycle`](Self::reserve_lifecycle).
    pub fn release_lifecycle(&self, name: &str) {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = queues.get_mut(name) {
            entry.reserved = false;
        }
    }

    /// Record the lifecycle manager of a queue whose slot was reserved.
    ///
    /// Returns false if the queue was removed in the meantime or already has
    /// a manager.
    pub fn register_lifecycle(&self, name: &str, lifecycle: ActorRef<LifecycleMessage>) -> bool {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        match queues.get_mut(name) {
            Some(entry) if entry.lifecycle.is_none() => {
                entry.lifecycle = Some(lifecycle);
                entry.reserved = false;
                true
            }
            _ => false,
        }
    }

    pub fn get_queue(&self, name: &str) -> Option<QueueHandle> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        queues.get(name).map(|entry| entry.handle.clone())
    }

    pub fn get_lifecycle(&self, name: &str) -> Option<ActorRef<LifecycleMessage>> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        queues.get(name).and_then(|entry| entry.lifecycle.clone())
    }

    /// List all registered queue names.
    pub fn list_queues(&self) -> Vec<String> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every queue, handing back what was registered.
    pub(crate) fn drain(&self) -> Vec<(QueueHandle, Option<ActorRef<LifecycleMessage>>)> {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        queues
            .drain()
            .map(|(_, entry)| (entry.handle, entry.lifecycle))
            .collect()
    }
}
