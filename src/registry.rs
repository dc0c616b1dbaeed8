//! Session registry and recent-history cache.
//!
//! One structure owns all per-identity live state: the map of connected
//! tracked users (identity -> outbound channel) and the track map (latest
//! position + bounded recent history per identity). Track entries outlive
//! the connection that produced them: disconnect removes only the live
//! channel, never the cached positions. Only a process restart clears them.

use std::collections::{HashMap, VecDeque};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::ws::ConnectionSender;

/// Default per-identity history cap.
pub const DEFAULT_HISTORY_CAP: usize = 200;

/// One timestamped position observation. Immutable once created;
/// only ever appended to the cache and the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub identity: String,
    pub lat: f64,
    pub lon: f64,
    /// Epoch seconds, stamped server-side on receipt.
    pub ts: i64,
}

/// Cached state for one identity: most recent sample plus a FIFO-bounded
/// buffer of recent samples in arrival order.
#[derive(Debug, Clone)]
struct Track {
    latest: PositionSample,
    history: VecDeque<PositionSample>,
}

/// Registry of live tracked-user sessions and their recent tracks.
/// Safe for concurrent use from any number of connection tasks; one
/// identity's mutations never touch another's entry.
pub struct TrackerRegistry {
    history_cap: usize,
    /// identity -> outbound channel of the currently connected session.
    /// At most one entry per identity; a reconnect silently replaces it.
    sessions: DashMap<String, ConnectionSender>,
    /// identity -> latest + bounded history. Both live in one entry so a
    /// sample is never observed half-applied for an identity.
    tracks: DashMap<String, Track>,
}

impl TrackerRegistry {
    pub fn new(history_cap: usize) -> Self {
        Self {
            history_cap,
            sessions: DashMap::new(),
            tracks: DashMap::new(),
        }
    }

    /// Register a live session, replacing any previous entry for the
    /// identity. Idempotent; replacement of a still-open session is the
    /// documented reconnect behavior, not an error.
    pub fn register(&self, identity: &str, sender: ConnectionSender) {
        self.sessions.insert(identity.to_string(), sender);
        tracing::debug!(identity = %identity, "Session registered");
    }

    /// Remove the live session for an identity, but only if it is still the
    /// given channel. A stale connection's cleanup racing a reconnect must
    /// not remove the replacement session.
    pub fn unregister(&self, identity: &str, sender: &ConnectionSender) {
        self.sessions
            .remove_if(identity, |_, current| current.same_channel(sender));
        tracing::debug!(identity = %identity, "Session unregistered");
    }

    /// Outbound channel of the currently connected session, if any.
    pub fn live_sender(&self, identity: &str) -> Option<ConnectionSender> {
        self.sessions.get(identity).map(|s| s.value().clone())
    }

    /// Number of currently connected tracked users.
    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }

    /// Record a sample: overwrite the identity's latest position and append
    /// to its history, evicting the oldest entry once the cap is reached.
    pub fn record_sample(&self, sample: PositionSample) {
        let mut entry = self
            .tracks
            .entry(sample.identity.clone())
            .or_insert_with(|| Track {
                latest: sample.clone(),
                history: VecDeque::with_capacity(16),
            });
        let track = entry.value_mut();
        track.latest = sample.clone();
        track.history.push_back(sample);
        if track.history.len() > self.history_cap {
            track.history.pop_front();
        }
    }

    /// Point-in-time copy of all tracks for the admin initial snapshot.
    /// Per-identity state is copied under that entry's lock; consistency
    /// across identities is not guaranteed (and not required).
    #[allow(clippy::type_complexity)]
    pub fn snapshot(
        &self,
    ) -> (
        HashMap<String, PositionSample>,
        HashMap<String, Vec<PositionSample>>,
    ) {
        let mut latest = HashMap::with_capacity(self.tracks.len());
        let mut history = HashMap::with_capacity(self.tracks.len());
        for entry in self.tracks.iter() {
            let track = entry.value();
            latest.insert(entry.key().clone(), track.latest.clone());
            history.insert(
                entry.key().clone(),
                track.history.iter().cloned().collect(),
            );
        }
        (latest, history)
    }
}
