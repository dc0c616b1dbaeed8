//! Wire types for the real-time channels.
//!
//! Tracked users send bare `{"lat": f64, "lon": f64}` text frames; the
//! server stamps the timestamp. Admins receive `type`-tagged JSON events:
//! one `initial` snapshot at connect, then one `update` per sample.

use std::collections::HashMap;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::registry::{PositionSample, TrackerRegistry};

/// Inbound position report from a tracked user. Both fields must be
/// numeric; anything else fails deserialization, which is fatal to the
/// producing connection.
#[derive(Debug, Deserialize)]
pub struct PositionReport {
    pub lat: f64,
    pub lon: f64,
}

/// A position as it appears on the admin wire and in history responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WirePosition {
    pub lat: f64,
    pub lon: f64,
    pub ts: i64,
}

impl From<&PositionSample> for WirePosition {
    fn from(sample: &PositionSample) -> Self {
        Self {
            lat: sample.lat,
            lon: sample.lon,
            ts: sample.ts,
        }
    }
}

/// Outbound event on the admin channel.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdminEvent {
    /// Full point-in-time state, sent once when an admin connects.
    Initial {
        latest: HashMap<String, WirePosition>,
        history: HashMap<String, Vec<WirePosition>>,
    },
    /// One live sample, broadcast to every admin as it arrives.
    Update {
        identity: String,
        lat: f64,
        lon: f64,
        ts: i64,
    },
}

impl AdminEvent {
    /// Build the initial snapshot event from the registry's current state.
    pub fn initial(registry: &TrackerRegistry) -> Self {
        let (latest, history) = registry.snapshot();
        AdminEvent::Initial {
            latest: latest
                .iter()
                .map(|(id, s)| (id.clone(), WirePosition::from(s)))
                .collect(),
            history: history
                .iter()
                .map(|(id, samples)| {
                    (id.clone(), samples.iter().map(WirePosition::from).collect())
                })
                .collect(),
        }
    }

    pub fn update(sample: &PositionSample) -> Self {
        AdminEvent::Update {
            identity: sample.identity.clone(),
            lat: sample.lat,
            lon: sample.lon,
            ts: sample.ts,
        }
    }

    /// Serialize to a WebSocket text frame.
    pub fn to_message(&self) -> Message {
        // AdminEvent serialization cannot fail: string keys, finite floats
        // come straight off the wire, no non-string map keys.
        let json = serde_json::to_string(self).unwrap_or_default();
        Message::Text(json.into())
    }
}
