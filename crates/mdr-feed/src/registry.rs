//! Subscription registry: id → running link.
//!
//! Owned by a single [`Connector`](crate::connector::Connector); never shared
//! or locked. Removing an entry signals its task to stop.

use ahash::AHashMap;
use mdr_core::{FeedKind, LinkStatus, SubscriptionId, Target};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::link::LinkHandle;

/// One registered subscription.
pub struct RegistryEntry {
    pub kind: FeedKind,
    pub target: Target,
    status_rx: watch::Receiver<LinkStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RegistryEntry {
    pub fn new(kind: FeedKind, target: Target, handle: LinkHandle) -> Self {
        Self {
            kind,
            target,
            status_rx: handle.status_rx,
            shutdown_tx: handle.shutdown_tx,
            task: handle.task,
        }
    }

    /// Latest status published by the task.
    pub fn status(&self) -> LinkStatus {
        *self.status_rx.borrow()
    }

    /// Ask the task to stop and hand back its join handle.
    pub fn stop(self) -> JoinHandle<()> {
        // An error only means the task already exited.
        let _ = self.shutdown_tx.send(true);
        self.task
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: AHashMap<SubscriptionId, RegistryEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: SubscriptionId, entry: RegistryEntry) {
        self.entries.insert(id, entry);
    }

    pub fn get(&self, id: &SubscriptionId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn unregister(&mut self, id: &SubscriptionId) -> Option<RegistryEntry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<(SubscriptionId, RegistryEntry)> {
        self.entries.drain().collect()
    }

    /// Remove entries whose task has given up.
    pub fn remove_abandoned(&mut self) -> Vec<SubscriptionId> {
        let dead: Vec<SubscriptionId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.status().state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dead {
            self.entries.remove(id);
        }
        dead
    }
}
