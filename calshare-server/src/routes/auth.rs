//! Registration and session endpoints
//!
//! The refresh token travels only in an HttpOnly cookie scoped to `/auth`;
//! the access token goes in the JSON body.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderName, StatusCode, header::SET_COOKIE},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use calshare_core::CalShareError;
use calshare_core::account::Session;
use calshare_core::user::{NewUser, User};

use crate::extract::{AuthUser, REFRESH_COOKIE, RefreshCookie};
use crate::routes::{ApiJson, AppError};
use crate::state::{AppState, blocking};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/confirm-email/{token}", post(confirm_email))
        .route("/auth/me", get(me))
}

fn refresh_cookie(token: &str, max_age: Duration) -> String {
    format!(
        "{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/auth; Max-Age={}",
        max_age.as_secs()
    )
}

/// POST /auth/register - Create an account and mail a confirmation link
async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let accounts = state.accounts.clone();
    let user = blocking(move || accounts.create_account(&req)).await?;
    state.accounts.send_confirmation(&user).await;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Login name or email address
    pub login: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

type SessionResponse = ([(HeaderName, String); 1], Json<LoginResponse>);

fn session_response(session: Session, refresh_ttl: Duration) -> SessionResponse {
    (
        [(SET_COOKIE, refresh_cookie(&session.refresh_token, refresh_ttl))],
        Json(LoginResponse {
            access_token: session.access_token,
            user: session.user,
        }),
    )
}

/// POST /auth/login - Exchange credentials for a session
async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<SessionResponse, AppError> {
    let accounts = state.accounts.clone();
    let session = blocking(move || accounts.login(&req.login, &req.password)).await?;
    Ok(session_response(session, state.accounts.refresh_ttl()))
}

/// POST /auth/refresh - Rotate the refresh cookie and issue a new access token
async fn refresh(
    State(state): State<AppState>,
    RefreshCookie(token): RefreshCookie,
) -> Result<SessionResponse, AppError> {
    let token = token.ok_or_else(|| {
        CalShareError::Unauthorized("The refresh token is invalid or expired.".to_string())
    })?;

    let accounts = state.accounts.clone();
    let session = blocking(move || accounts.refresh(&token)).await?;
    Ok(session_response(session, state.accounts.refresh_ttl()))
}

/// POST /auth/logout - Forget the refresh token and clear the cookie
async fn logout(
    State(state): State<AppState>,
    RefreshCookie(token): RefreshCookie,
) -> Result<(StatusCode, [(HeaderName, String); 1]), AppError> {
    if let Some(token) = token {
        let accounts = state.accounts.clone();
        blocking(move || accounts.logout(&token)).await?;
    }
    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, refresh_cookie("", Duration::ZERO))],
    ))
}

/// POST /auth/confirm-email/:token - Confirm the address of a new account
async fn confirm_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    let accounts = state.accounts.clone();
    blocking(move || accounts.confirm_email(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/me - The authenticated user
async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
