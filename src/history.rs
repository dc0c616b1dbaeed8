//! REST query endpoint for stored position history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::registry::DEFAULT_HISTORY_CAP;
use crate::state::AppState;
use crate::store;
use crate::ws::protocol::WirePosition;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /api/history/{identity}?limit=K — most recent stored samples for an
/// identity, newest first. Bearer auth required; the caller must be an
/// admin or be querying their own identity. Limit is clamped to [1, 200].
pub async fn get_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(identity): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<WirePosition>>, (StatusCode, String)> {
    if !claims.is_admin && claims.sub != identity {
        return Err((
            StatusCode::FORBIDDEN,
            "history is readable by admins or the identity itself".to_string(),
        ));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_CAP)
        .clamp(1, DEFAULT_HISTORY_CAP);

    let db = state.db.clone();
    let samples = tokio::task::spawn_blocking(move || store::query_recent(&db, &identity, limit))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Task join: {}", e),
            )
        })?
        .map_err(|e| {
            tracing::warn!(error = %e, "History query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "query failed".to_string())
        })?;

    Ok(Json(samples.iter().map(WirePosition::from).collect()))
}
