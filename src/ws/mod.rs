pub mod actor;
pub mod handler;
pub mod protocol;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// Sender half of a tracked-user connection's outbound channel. Only pongs
/// and close frames flow to tracked users, so this stays unbounded.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Sender half of an admin observer's outbound channel. Bounded so a slow
/// admin backs up its own queue instead of the broadcasting connection.
pub type ObserverSender = mpsc::Sender<Message>;

/// Per-admin outbound queue depth. Updates beyond this are dropped for
/// that observer (best-effort delivery).
pub const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// WebSocket close codes:
/// 1008 = policy violation (failed or insufficient credential)
/// 1007 = invalid payload (malformed position report)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
