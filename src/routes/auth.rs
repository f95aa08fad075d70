// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account registration and session routes.

use crate::error::{collect_issues, AppError, Result};
use crate::middleware::auth::{clear_session_cookie, create_jwt, session_cookie, AuthUser};
use crate::models::{User, UserProfile};
use crate::services::password::{hash_password, verify_password};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Public auth routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// Auth routes that need a session.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/me", get(me))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Session response; `token` is also set as the session cookie.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
}

fn json_error(e: JsonRejection) -> AppError {
    AppError::BadRequest(e.body_text())
}

/// Issue a session for `user` and attach the cookie.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let auth_user = AuthUser {
        user_id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
    };
    let token = create_jwt(&auth_user, &state.config.jwt_signing_key)?;
    let jar = jar.add(session_cookie(token.clone(), state.config.secure_cookies()));

    Ok((
        jar,
        Json(AuthResponse {
            user: user.profile(),
            token,
        }),
    ))
}

/// Register a new user. The quota account is created lazily on first use.
async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let Json(mut req) = payload.map_err(json_error)?;
    req.email = User::key_for(&req.email);

    if let Err(errors) = req.validate() {
        let mut issues = Vec::new();
        collect_issues("", &errors, &mut issues);
        issues.sort();
        return Err(AppError::Validation(issues));
    }

    let iterations = state.config.password_hash_iterations;
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))?;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: req.email,
        name: req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        password_hash,
        created_at: format_utc_rfc3339(chrono::Utc::now()),
    };

    if !state.users.insert_user(&user).await? {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    tracing::info!(user_id = %user.id, "User registered");

    let (jar, body) = start_session(&state, jar, &user)?;
    Ok((StatusCode::CREATED, jar, body))
}

/// Log in with email and password.
///
/// Unknown email and wrong password produce the same response.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let Json(req) = payload.map_err(json_error)?;

    let user = state
        .users
        .get_user_by_email(&req.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let stored = user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password check failed: {}", e)))?;

    if !valid {
        tracing::info!(user_id = %user.id, "Login rejected");
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!(user_id = %user.id, "User logged in");
    start_session(&state, jar, &user)
}

/// Clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.add(clear_session_cookie(state.config.secure_cookies())),
        StatusCode::NO_CONTENT,
    )
}

/// Current session identity.
async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        email: user.email,
        name: user.name,
    })
}
