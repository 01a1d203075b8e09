use crate::AppState;
use crate::error::AppError;
use crate::helpers::now_millis;
use crate::models::{HostRole, player_name};
use crate::relay::RemoteAction;
use crate::validation;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_macros::debug_handler;
use mkutils_store::SyncStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Deserialize)]
pub(crate) struct JoinRequest {
    player: String,
    server: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Deserialize)]
pub(crate) struct LeaveRequest {
    player: String,
    server: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SyncRequest {
    players: Vec<String>,
    server: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    sync: SyncStatus,
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    role: HostRole,
    server_name: String,
    owns_presence: bool,
    sync: SyncStatus,
    owned_servers: Vec<String>,
    local_players: usize,
    pending_actions: usize,
}

#[derive(Serialize)]
pub(crate) struct PlayerLocation {
    player: String,
    server: String,
}

#[derive(Serialize)]
pub(crate) struct CountResponse {
    global: usize,
    servers: BTreeMap<String, usize>,
}

#[derive(Serialize)]
pub(crate) struct PublishResponse {
    receivers: usize,
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sync = state.manager.status();
    if sync.is_healthy() {
        (StatusCode::OK, Json(HealthResponse { status: "ok", sync }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                sync,
            }),
        )
    }
}

pub(crate) async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        role: state.role,
        server_name: state.server_name.clone(),
        owns_presence: state.owns_presence,
        sync: state.manager.status(),
        owned_servers: state.directory.owned_servers().await,
        local_players: state.host.local_players().await.len(),
        pending_actions: state.host.pending().await,
    })
}

/// Resolve the target server of a host call, defaulting to this sidecar's own.
fn target_server(state: &AppState, server: Option<String>) -> Result<String, AppError> {
    let server = server.unwrap_or_else(|| state.server_name.clone());
    validation::validate_server_name(&server)?;
    Ok(server)
}

#[debug_handler]
pub(crate) async fn join(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = player_name(&payload.player)?;
    let server = target_server(&state, payload.server)?;

    state
        .host
        .player_joined(name, payload.permissions, now_millis())
        .await;

    if state.owns_presence {
        state
            .directory
            .notify_player_joined_server(&payload.player, &server)
            .await?;
    }

    Ok(StatusCode::OK)
}

pub(crate) async fn leave(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LeaveRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_player_name(&payload.player)?;
    let server = target_server(&state, payload.server)?;

    state.host.player_left(&payload.player).await;

    if state.owns_presence {
        state
            .directory
            .notify_player_left_server(&payload.player, &server)
            .await?;
    }

    Ok(StatusCode::OK)
}

pub(crate) async fn sync(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Validate player list (size and individual names)
    validation::validate_player_list(&payload.players)?;
    let server = target_server(&state, payload.server)?;

    let names = payload
        .players
        .iter()
        .map(|player| player_name(player))
        .collect::<Result<Vec<_>, _>>()?;
    state.host.sync_players(&names, now_millis()).await;

    if state.owns_presence {
        state
            .directory
            .sync_server_players(&server, &payload.players)
            .await?;
    }

    Ok(StatusCode::OK)
}

pub(crate) async fn servers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.directory.query().snapshot().await?))
}

pub(crate) async fn players(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.directory.query().online_players().await?))
}

pub(crate) async fn player(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_player_name(&name)?;

    match state.directory.query().player_server(&name).await? {
        Some(server) => Ok(Json(PlayerLocation {
            player: name,
            server,
        })),
        None => Err(AppError::NotFound(format!("Player '{}' is not online", name))),
    }
}

pub(crate) async fn count(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.directory.query().snapshot().await?;
    let servers: BTreeMap<String, usize> = snapshot
        .iter()
        .map(|(server, players)| (server.clone(), players.len()))
        .collect();
    let global = snapshot
        .into_values()
        .flatten()
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    Ok(Json(CountResponse { global, servers }))
}

#[debug_handler]
pub(crate) async fn publish_action(
    State(state): State<Arc<AppState>>,
    Json(action): Json<RemoteAction>,
) -> Result<impl IntoResponse, AppError> {
    // Presence claims come from directories only
    if matches!(action, RemoteAction::PresenceClaim { .. }) {
        return Err(AppError::Forbidden(
            "Presence claims cannot be published over HTTP".to_string(),
        ));
    }

    let receivers = state.relay.publish(&action).await?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { receivers })))
}

pub(crate) async fn pending_actions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.host.drain().await)
}
