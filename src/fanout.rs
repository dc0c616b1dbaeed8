//! Admin fan-out set.
//!
//! A dynamic set of connected admin observers, each behind a bounded
//! outbound queue. Broadcast is best-effort and fire-and-forget: a full
//! queue drops the message for that observer only, a closed queue drops
//! the observer. Nothing here ever blocks the broadcasting connection.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;

use crate::ws::ObserverSender;

/// Process-unique handle for one admin observer's membership.
pub type ObserverId = u64;

pub struct AdminFanout {
    seq: AtomicU64,
    observers: DashMap<ObserverId, ObserverSender>,
}

impl AdminFanout {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            observers: DashMap::new(),
        }
    }

    /// Add an observer and return its membership handle.
    pub fn add(&self, sender: ObserverSender) -> ObserverId {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, sender);
        tracing::debug!(observer_id = id, observers = self.observers.len(), "Admin observer added");
        id
    }

    /// Remove an observer; no-op if already gone.
    pub fn remove(&self, id: ObserverId) {
        self.observers.remove(&id);
        tracing::debug!(observer_id = id, observers = self.observers.len(), "Admin observer removed");
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Attempt a non-blocking send of the message to every current observer.
    /// A full queue skips that observer for this message; a closed queue
    /// evicts the observer. Failures never propagate to the caller.
    pub fn broadcast(&self, msg: Message) {
        let mut dead: Vec<ObserverId> = Vec::new();
        for entry in self.observers.iter() {
            match entry.value().try_send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(observer_id = *entry.key(), "Admin queue full, dropping update");
                }
                Err(TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        // Evict after iteration; removing while holding shard locks can deadlock.
        for id in dead {
            self.remove(id);
        }
    }
}

impl Default for AdminFanout {
    fn default() -> Self {
        Self::new()
    }
}
