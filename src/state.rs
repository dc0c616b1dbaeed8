use std::sync::Arc;

use tokio::sync::mpsc;

use crate::db::DbPool;
use crate::fanout::AdminFanout;
use crate::registry::{PositionSample, TrackerRegistry};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Live tracked-user sessions + per-identity recent tracks
    pub registry: Arc<TrackerRegistry>,
    /// Connected admin observers
    pub admins: Arc<AdminFanout>,
    /// Bounded queue into the durable-store writer task
    pub store_tx: mpsc::Sender<PositionSample>,
}
