//! JSON REST handlers.

use crate::auth::{Authorized, Principal, Session, bearer_token};
use crate::bridge::{AccessoryState, TargetDoorState, TargetOutcome};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use garage_core::{DoorId, DoorStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Routes mounted under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status_all))
        .route("/status/{door_id}", get(status_one))
        .route("/trigger/{door_id}", post(trigger))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/homekit", get(homekit_all))
        .route("/homekit/{door_id}", get(homekit_one).put(homekit_target))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoorStatusResponse {
    pub door_id: DoorId,
    pub status: DoorStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub target_door_state: TargetDoorState,
}

fn parse_door_id(raw: &str) -> Result<DoorId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid door id: {raw}")))
}

/// `GET /api/status`
async fn status_all(State(state): State<AppState>) -> Json<BTreeMap<DoorId, DoorStatus>> {
    Json(state.controller.get_all_status())
}

/// `GET /api/status/{door_id}`
async fn status_one(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<DoorStatusResponse>, ApiError> {
    let door_id = parse_door_id(&raw)?;
    let status = state.controller.get_status(door_id)?;
    Ok(Json(DoorStatusResponse { door_id, status }))
}

/// `POST /api/trigger/{door_id}`
async fn trigger(
    Authorized(principal): Authorized,
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let door_id = parse_door_id(&raw)?;
    tracing::info!(door = %door_id, ?principal, "trigger requested");
    state.controller.trigger(door_id).await?;
    Ok(Json(MessageResponse {
        message: format!("Door {door_id} triggered successfully"),
    }))
}

/// `POST /api/login`
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Session>, ApiError> {
    state
        .auth
        .login(&request.username, &request.password)
        .map(Json)
        .ok_or(ApiError::Unauthorized("invalid username or password"))
}

/// `POST /api/logout`
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized("missing bearer token"))?;
    if !state.auth.logout(token) {
        return Err(ApiError::Unauthorized("invalid bearer token"));
    }
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// `GET /api/homekit`
async fn homekit_all(State(state): State<AppState>) -> Json<BTreeMap<DoorId, AccessoryState>> {
    Json(state.homekit.snapshot())
}

/// `GET /api/homekit/{door_id}`
async fn homekit_one(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<AccessoryState>, ApiError> {
    let door_id = parse_door_id(&raw)?;
    state
        .homekit
        .accessory(door_id)
        .map(Json)
        .ok_or(ApiError::Controller(garage_core::Error::InvalidDoorId(
            door_id.get(),
        )))
}

/// `PUT /api/homekit/{door_id}`
async fn homekit_target(
    Authorized(principal): Authorized,
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(request): Json<TargetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let door_id = parse_door_id(&raw)?;
    if let Principal::User { username, .. } = &principal {
        tracing::debug!(door = %door_id, username, "homekit target from user");
    }
    let outcome = state
        .homekit
        .set_target(&state.controller, door_id, request.target_door_state)
        .await?;
    let message = match outcome {
        TargetOutcome::Triggered => format!("Door {door_id} triggered successfully"),
        TargetOutcome::Unchanged => format!("Door {door_id} already at target"),
    };
    Ok(Json(MessageResponse { message }))
}
