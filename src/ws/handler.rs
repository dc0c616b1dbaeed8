use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::{jwt, AuthError};
use crate::state::AppState;
use crate::store;
use crate::ws::{actor, CLOSE_POLICY_VIOLATION};

/// Query parameters for WebSocket connection.
/// Auth is via query param ?token=JWT — browsers cannot set WS headers.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// GET /ws/user?token=JWT
/// Tracked-user ingestion endpoint. On auth failure, upgrades then
/// immediately closes with 1008 and no registration takes place.
/// On success, spawns the ingestion actor for the connection.
pub async fn user_ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => {
            tracing::info!(identity = %claims.sub, "Tracked-user connection authenticated");
            ws.on_upgrade(move |socket| actor::run_user_connection(socket, state, claims.sub))
        }
        Err(err) => reject(ws, AuthError::Invalid(err)),
    }
}

/// GET /ws/admin?token=JWT
/// Admin observer endpoint. The token must decode AND carry the admin
/// role, and the role is re-checked against the user store before the
/// connection enters the fan-out set.
pub async fn admin_ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match authorize_admin(&state, &params.token).await {
        Ok(identity) => {
            tracing::info!(identity = %identity, "Admin connection authorized");
            ws.on_upgrade(move |socket| actor::run_admin_connection(socket, state, identity))
        }
        Err(err) => reject(ws, err),
    }
}

/// Decode the token, require the admin claim, then re-check the role
/// against the user store.
async fn authorize_admin(state: &AppState, token: &str) -> Result<String, AuthError> {
    let claims = jwt::validate_access_token(&state.jwt_secret, token)?;
    if !claims.is_admin {
        return Err(AuthError::Forbidden);
    }

    let db = state.db.clone();
    let identity = claims.sub.clone();
    let is_admin = tokio::task::spawn_blocking(move || store::user_is_admin(&db, &identity))
        .await
        .ok()
        .and_then(|r| {
            r.map_err(|e| tracing::warn!(error = %e, "Admin role re-check failed"))
                .ok()
        })
        .unwrap_or(false);

    if is_admin {
        Ok(claims.sub)
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Upgrade the connection, then immediately close it with a policy
/// violation frame. The close reason distinguishes expiry from the rest.
fn reject(ws: WebSocketUpgrade, err: AuthError) -> Response {
    let reason = match &err {
        AuthError::Invalid(_) if err.is_expired() => "token expired",
        AuthError::Invalid(_) => "token invalid",
        AuthError::Forbidden => "admin role required",
    };

    tracing::warn!(reason = reason, "WebSocket auth failed");

    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}
