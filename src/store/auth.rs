use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::api::{ApiError, SharedState};
use crate::models::User;

/// The caller behind a valid bearer token.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;

        let lookup = token.clone();
        let user = state
            .db
            .call(move |db| db.session_user(&lookup))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))?;
        Ok(Self { user, token })
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for (field, value) in [
        ("username", &req.username),
        ("email", &req.email),
        ("password", &req.password),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{} is required", field)));
        }
    }

    let ttl = state.session_ttl;
    let issued = state
        .db
        .call(move |db| {
            let Some(user) = db.create_user(&req.username, &req.email, &req.password)? else {
                return Ok(None);
            };
            let token = db.create_session(&user.id, ttl)?;
            Ok(Some(AuthResponse { token, user }))
        })
        .await?;

    match issued {
        Some(resp) => {
            info!(user = %resp.user.username, "registered user");
            Ok((StatusCode::CREATED, Json(resp)))
        }
        None => Err(ApiError::Conflict("User already exists".into())),
    }
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ttl = state.session_ttl;
    let issued = state
        .db
        .call(move |db| {
            let Some(user) = db.verify_credentials(&req.email, &req.password)? else {
                return Ok(None);
            };
            let token = db.create_session(&user.id, ttl)?;
            Ok(Some(AuthResponse { token, user }))
        })
        .await?;
    issued
        .map(Json)
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".into()))
}

pub async fn logout(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let token = auth.token;
    state.db.call(move |db| db.delete_session(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}
