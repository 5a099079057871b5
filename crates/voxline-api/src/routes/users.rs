use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use voxline_types::api::{LoginRequest, RegisterRequest};

use crate::error::AppError;
use crate::state::AppState;

/// POST /users/register — 201 with the new user; the password is never echoed.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.register(&req.username, &req.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .validate_credentials(&req.username, &req.password)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(user))
}

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.users.list_all().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))?;
    Ok(Json(user))
}

pub async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .get_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user '{}' not found", username)))?;
    Ok(Json(user))
}
