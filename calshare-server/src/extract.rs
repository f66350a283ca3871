//! Request extractors: the authenticated caller, the refresh cookie and
//! the client address.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;

use calshare_core::CalShareError;
use calshare_core::token::AccessClaims;
use calshare_core::user::User;

use crate::routes::AppError;
use crate::state::AppState;

/// The user behind a valid `Authorization: Bearer <token>` header.
pub struct AuthUser(pub User);

fn unauthorized() -> AppError {
    AppError(CalShareError::Unauthorized(
        "Authentication required.".to_string(),
    ))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(unauthorized)?;

        let claims: AccessClaims = state.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected access token");
            unauthorized()
        })?;

        // The account may have been removed since the token was issued.
        let user = state
            .store
            .find_user(claims.user_id)?
            .ok_or_else(unauthorized)?;

        Ok(AuthUser(user))
    }
}

/// Name of the cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Value of the refresh cookie, if the request carries a non-empty one.
pub struct RefreshCookie(pub Option<String>);

impl<S> FromRequestParts<S> for RefreshCookie
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == REFRESH_COOKIE)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(RefreshCookie(token))
    }
}

/// Best guess at the client's address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_ip = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok())
        };

        let ip = header_ip("x-forwarded-for")
            .or_else(|| header_ip("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            });

        Ok(ClientIp(ip))
    }
}
