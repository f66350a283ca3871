pub mod auth;
pub mod calendars;
pub mod events;

use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use calshare_core::{CalShareError, CalShareResult};

use crate::state::AppState;

/// The full API, ready to serve.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(auth::router())
        .merge(calendars::router())
        .merge(events::router())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Turns domain errors into HTTP responses
#[derive(Debug)]
pub struct AppError(pub CalShareError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let error = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            tracing::error!(error = %self.0, "request failed");
            "Internal server error".to_string()
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<CalShareError> for AppError {
    fn from(err: CalShareError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CalShareError::Validation(rejection.body_text()))
    }
}

/// JSON request body whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Parse a comma separated query value such as `roles=admin,guest`.
/// Blank entries are skipped.
pub(crate) fn parse_list<T>(raw: Option<&str>) -> CalShareResult<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| CalShareError::Validation(format!("Invalid value '{s}': {e}")))
        })
        .collect()
}
