//! Session Registry (C5) & Disconnect Coordinator (C6).
//!
//! The registry is a process-wide `key -> Session` map; `DashMap` gives us
//! per-shard locking so admission (check-and-insert) is a single atomic
//! critical section without a coarser mutex around the whole map, matching
//! the teacher's use of `DashMap` for exactly this kind of registry.
//!
//! The Disconnect Coordinator is the *only* writer of the registry-remove
//! operation. Agent read loops signal teardown exclusively by pushing their
//! key onto `disconnect_tx`; they never call `remove` directly.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::session::Session;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    disconnect_tx: mpsc::UnboundedSender<String>,
}

impl SessionRegistry {
    /// Creates the registry and spawns its Disconnect Coordinator task.
    pub fn spawn() -> Arc<Self> {
        let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<String>();
        let registry = Arc::new(Self {
            sessions: DashMap::new(),
            disconnect_tx,
        });

        let coordinator = registry.clone();
        tokio::spawn(async move {
            while let Some(key) = disconnect_rx.recv().await {
                tracing::info!(%key, "disconnecting session");
                if let Some(session) = coordinator.lookup(&key) {
                    session.disconnect_operator().await;
                }
                coordinator.remove(&key);
            }
        });

        registry
    }

    /// Admits a new Agent Session iff `key` is not already registered.
    pub fn admit_agent(&self, key: String, session: Session) -> Result<Arc<Session>, ()> {
        match self.sessions.entry(key) {
            Entry::Occupied(_) => Err(()),
            Entry::Vacant(slot) => {
                let session = Arc::new(session);
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Idempotent removal; used exclusively by the Disconnect Coordinator.
    pub fn remove(&self, key: &str) {
        self.sessions.remove(key);
    }

    /// The only way an Agent read loop signals its own teardown.
    pub fn request_disconnect(&self, key: String) {
        // The coordinator task holds the receiver for the lifetime of the
        // registry, so this can only fail during process shutdown.
        let _ = self.disconnect_tx.send(key);
    }
}
