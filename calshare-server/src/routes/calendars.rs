//! Calendar endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use calshare_core::authz::authorize_calendar;
use calshare_core::calendar::{Calendar, CalendarUpdate, CalendarWithRole, NewCalendar};
use calshare_core::holiday::Holiday;
use calshare_core::membership::Member;
use calshare_core::user::UserSummary;
use calshare_core::validation::{check_email, validate_calendar_update, validate_new_calendar};
use calshare_core::{Action, CalShareError, ResourceKind, Role};

use crate::extract::{AuthUser, ClientIp};
use crate::routes::{ApiJson, AppError, parse_list};
use crate::state::{AppState, blocking};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calendars", get(list_calendars).post(create_calendar))
        .route("/calendars/holidays", get(holidays))
        .route(
            "/calendars/{id}",
            get(get_calendar).put(update_calendar).delete(delete_calendar),
        )
        .route("/calendars/{id}/invited", get(invited_users))
        .route("/calendars/{id}/not-invited", get(not_invited_users))
        .route("/calendars/{id}/invite", post(share_calendar))
        .route("/calendars/invite-confirm/{token}", post(confirm_calendar))
}

fn not_found(id: i64) -> CalShareError {
    CalShareError::NotFound(format!("The calendar with id {id} was not found."))
}

#[derive(Deserialize)]
pub struct ListQuery {
    /// Comma separated roles, e.g. `admin,moderator`. Empty means any role.
    pub roles: Option<String>,
}

/// GET /calendars - Confirmed calendars of the caller
async fn list_calendars(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CalendarWithRole>>, AppError> {
    let roles: Vec<Role> = parse_list(query.roles.as_deref())?;
    let roles = if roles.is_empty() { Role::ALL.to_vec() } else { roles };

    let store = state.store.clone();
    let calendars = blocking(move || store.calendars_for_user(user.id, &roles)).await?;
    Ok(Json(calendars))
}

/// GET /calendars/holidays - Public holidays for the caller's region
async fn holidays(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    ClientIp(ip): ClientIp,
) -> Result<Json<Vec<Holiday>>, AppError> {
    Ok(Json(state.holidays.holidays_for_ip(ip).await?))
}

/// GET /calendars/:id
async fn get_calendar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Calendar>, AppError> {
    authorize_calendar(&state.store, Action::ReadCalendar, id, user.id)?;
    let calendar = state.store.find_calendar(id)?.ok_or_else(|| not_found(id))?;
    Ok(Json(calendar))
}

/// POST /calendars - Create a calendar owned by the caller
async fn create_calendar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<NewCalendar>,
) -> Result<(StatusCode, Json<Calendar>), AppError> {
    validate_new_calendar(&req)?;
    let calendar = state.store.create_calendar(user.id, &req)?;

    tracing::info!(calendar_id = calendar.id, user_id = user.id, "calendar created");
    Ok((StatusCode::CREATED, Json(calendar)))
}

/// PUT /calendars/:id
async fn update_calendar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<CalendarUpdate>,
) -> Result<(StatusCode, Json<Calendar>), AppError> {
    validate_calendar_update(&req)?;
    authorize_calendar(&state.store, Action::UpdateCalendar, id, user.id)?;

    let calendar = state
        .store
        .update_calendar(id, &req)?
        .ok_or_else(|| not_found(id))?;
    Ok((StatusCode::CREATED, Json(calendar)))
}

/// DELETE /calendars/:id - Delete a calendar and its events
async fn delete_calendar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Calendar>, AppError> {
    authorize_calendar(&state.store, Action::DeleteCalendar, id, user.id)?;

    let calendar = state.store.delete_calendar(id)?.ok_or_else(|| not_found(id))?;
    tracing::info!(calendar_id = id, user_id = user.id, "calendar deleted");
    Ok(Json(calendar))
}

/// GET /calendars/:id/invited - Other members and their confirmation state
async fn invited_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Member>>, AppError> {
    authorize_calendar(&state.store, Action::ListCalendarMembers, id, user.id)?;
    Ok(Json(state.store.members(ResourceKind::Calendar, id, user.id)?))
}

/// GET /calendars/:id/not-invited - Users who could still be invited
async fn not_invited_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    authorize_calendar(&state.store, Action::ListCalendarMembers, id, user.id)?;
    Ok(Json(
        state
            .store
            .users_without_membership(ResourceKind::Calendar, id)?,
    ))
}

#[derive(Deserialize)]
pub struct ShareRequest {
    pub email: String,
}

/// POST /calendars/:id/invite - Invite a user by email
async fn share_calendar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ShareRequest>,
) -> Result<StatusCode, AppError> {
    check_email(&req.email)?;
    state.invitations.share_calendar(id, &user, &req.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /calendars/invite-confirm/:token - Accept a calendar invitation
async fn confirm_calendar(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    state.invitations.confirm_calendar(&token)?;
    Ok(StatusCode::NO_CONTENT)
}
