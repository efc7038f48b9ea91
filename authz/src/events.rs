// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle event delivery
//!
//! Producers publish [`LifecycleEvent`]s through an [`EventSender`]; a
//! single [`Dispatcher`] task drains them in order and hands each to
//! the [`LifecycleSynchronizer`].  Running the synchronizer on one task
//! serializes all record mutation, so handlers can do fetch-modify-write
//! against the store without racing each other.
//!
//! Delivery is at least once.  Handlers tolerate duplicates, so a
//! producer that isn't sure an event was accepted can simply send it
//! again.

use crate::record::Role;
use crate::sync::LifecycleSynchronizer;
use slog::o;
use slog::Logger;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use uuid::Uuid;

/// A change elsewhere in the deployment that permission records must
/// reflect
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LifecycleEvent {
    UserCreated { user_id: Uuid, assigned_role: Role },
    UserDeleted { user_id: Uuid },
    WorkspaceCreated { workspace_id: Uuid, member_ids: Vec<Uuid> },
    WorkspaceUserRemoved { workspace_id: Uuid, user_id: Uuid },
    WorkspaceDeleted { workspace_id: Uuid },
}

impl LifecycleEvent {
    /// Returns the topic name used on the wire and in log entries.
    pub fn topic(&self) -> &'static str {
        match self {
            LifecycleEvent::UserCreated { .. } => "user.created",
            LifecycleEvent::UserDeleted { .. } => "user.deleted",
            LifecycleEvent::WorkspaceCreated { .. } => "workspace.created",
            LifecycleEvent::WorkspaceUserRemoved { .. } => {
                "workspace.user.removed"
            }
            LifecycleEvent::WorkspaceDeleted { .. } => "workspace.deleted",
        }
    }
}

/// Cloneable handle for publishing events to the dispatcher
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
    sent: Arc<AtomicU64>,
}

impl EventSender {
    /// Publishes an event.  Events published after the dispatcher has
    /// shut down are dropped.
    pub fn send(&self, event: LifecycleEvent) {
        self.sent.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(event);
    }
}

/// Owns the task that applies lifecycle events to the store
///
/// Dropping the dispatcher aborts the task.
pub struct Dispatcher {
    sender: EventSender,
    applied: watch::Receiver<u64>,
    task: tokio::task::JoinHandle<()>,
}

impl Dispatcher {
    pub fn start(sync: LifecycleSynchronizer, log: &Logger) -> Dispatcher {
        let log = log.new(o!("component" => "lifecycle-dispatcher"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (applied_tx, applied) = watch::channel(0u64);
        let task = tokio::task::spawn(async move {
            slog::debug!(log, "dispatcher running");
            let mut count: u64 = 0;
            while let Some(event) = rx.recv().await {
                sync.apply(&event).await;
                count += 1;
                // Fails only when nobody is waiting, which is fine.
                let _ = applied_tx.send(count);
            }
            slog::debug!(log, "dispatcher exiting"; "applied" => count);
        });
        Dispatcher {
            sender: EventSender { tx, sent: Arc::new(AtomicU64::new(0)) },
            applied,
            task,
        }
    }

    /// Returns a handle for publishing events.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Waits until every event published so far has been applied.
    ///
    /// Only events already published when this is called are waited
    /// for; concurrent publishes may or may not be covered.
    pub async fn flush(&self) {
        let target = self.sender.sent.load(Ordering::SeqCst);
        let mut applied = self.applied.clone();
        // An error means the dispatcher task is gone, in which case
        // there's nothing left to wait for.
        let _ = applied.wait_for(|count| *count >= target).await;
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::PermissionStore;
    use slog::Discard;

    #[tokio::test]
    async fn test_dispatcher_applies_in_order() {
        let log = Logger::root(Discard, o!());
        let store = Arc::new(MemoryStore::new());
        let sync = LifecycleSynchronizer::new(store.clone(), &log);
        let dispatcher = Dispatcher::start(sync, &log);
        let sender = dispatcher.sender();

        let user_id = Uuid::new_v4();
        let workspace_id = Uuid::new_v4();
        sender.send(LifecycleEvent::UserCreated {
            user_id,
            assigned_role: Role::User,
        });
        sender.send(LifecycleEvent::WorkspaceCreated {
            workspace_id,
            member_ids: vec![user_id],
        });
        dispatcher.flush().await;

        let record = store.fetch(user_id).await.unwrap();
        assert!(record.workspaces.contains_key(&workspace_id));

        sender.send(LifecycleEvent::UserDeleted { user_id });
        dispatcher.flush().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_flush_with_no_events() {
        let log = Logger::root(Discard, o!());
        let store = Arc::new(MemoryStore::new());
        let sync = LifecycleSynchronizer::new(store.clone(), &log);
        let dispatcher = Dispatcher::start(sync, &log);
        // Nothing published; this must not hang.
        dispatcher.flush().await;
        assert!(store.is_empty());
    }
}
