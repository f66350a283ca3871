//! Event endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;

use calshare_core::authz::{authorize_calendar, authorize_event};
use calshare_core::event::{Event, EventDraft, EventListing, EventType};
use calshare_core::membership::Member;
use calshare_core::user::UserSummary;
use calshare_core::validation::{check_email, validate_event_draft};
use calshare_core::{Action, CalShareError, ResourceKind, Role};

use crate::extract::AuthUser;
use crate::routes::{ApiJson, AppError, parse_list};
use crate::state::{AppState, blocking};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route(
            "/calendars/{id}/events",
            get(list_calendar_events).post(create_event),
        )
        .route(
            "/calendars/{id}/events/{event_id}",
            put(update_event).delete(delete_event),
        )
        .route("/events/{id}/invited", get(invited_users))
        .route("/events/{id}/not-invited", get(not_invited_users))
        .route("/events/{id}/invite", post(share_event))
        .route("/events/invite-confirm/{token}", post(confirm_event))
}

fn not_found(id: i64) -> CalShareError {
    CalShareError::NotFound(format!("The event with id {id} was not found."))
}

#[derive(Deserialize)]
pub struct ListQuery {
    /// Comma separated calendar ids. Empty means every confirmed calendar.
    pub calendars: Option<String>,
    /// Comma separated event types. Empty means all types.
    pub types: Option<String>,
}

/// GET /events - Events across several calendars
async fn list_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<EventListing>>, AppError> {
    let mut calendar_ids: Vec<i64> = parse_list(query.calendars.as_deref())?;
    let types: Vec<EventType> = parse_list(query.types.as_deref())?;

    let store = state.store.clone();
    let events = blocking(move || {
        if calendar_ids.is_empty() {
            calendar_ids = store.confirmed_calendar_ids(user.id)?;
        } else {
            for id in &calendar_ids {
                authorize_calendar(&store, Action::ReadCalendar, *id, user.id)?;
            }
        }
        store.events_for_user(user.id, &calendar_ids, &types)
    })
    .await?;

    Ok(Json(events))
}

/// GET /calendars/:id/events - Events of one calendar
async fn list_calendar_events(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(calendar_id): Path<i64>,
) -> Result<Json<Vec<EventListing>>, AppError> {
    let store = state.store.clone();
    let events = blocking(move || {
        authorize_calendar(&store, Action::ReadCalendar, calendar_id, user.id)?;
        store.events_for_user(user.id, &[calendar_id], &[])
    })
    .await?;
    Ok(Json(events))
}

/// POST /calendars/:id/events - Create an event and share it with the calendar
async fn create_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(calendar_id): Path<i64>,
    ApiJson(draft): ApiJson<EventDraft>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    validate_event_draft(&draft)?;
    authorize_calendar(&state.store, Action::CreateEvent, calendar_id, user.id)?;

    let calendar = state.store.find_calendar(calendar_id)?.ok_or_else(|| {
        CalShareError::NotFound(format!("The calendar with id {calendar_id} was not found."))
    })?;
    let color = draft.color.clone().unwrap_or(calendar.color);

    let (event, guests) = state
        .store
        .create_event(calendar_id, user.id, &draft, &color)?;

    tracing::info!(
        event_id = event.id,
        calendar_id,
        user_id = user.id,
        guests,
        "event created"
    );
    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /calendars/:id/events/:eventId
async fn update_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((_calendar_id, event_id)): Path<(i64, i64)>,
    ApiJson(draft): ApiJson<EventDraft>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    validate_event_draft(&draft)?;
    authorize_event(&state.store, Action::UpdateEvent, event_id, user.id)?;

    let event = state
        .store
        .update_event(event_id, &draft)?
        .ok_or_else(|| not_found(event_id))?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// DELETE /calendars/:id/events/:eventId
///
/// The event's admin deletes it for everyone; a guest only leaves it.
async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((calendar_id, event_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    authorize_calendar(&state.store, Action::ReadCalendar, calendar_id, user.id)?;
    let membership = authorize_event(&state.store, Action::DeleteEvent, event_id, user.id)?;

    match membership.role {
        Role::Admin => {
            state.store.delete_event(event_id)?;
            tracing::info!(event_id, user_id = user.id, "event deleted");
        }
        _ => {
            let unlinked = state.store.leave_event(user.id, event_id, calendar_id)?;
            tracing::info!(event_id, calendar_id, user_id = user.id, unlinked, "guest left event");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// GET /events/:id/invited
async fn invited_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Member>>, AppError> {
    authorize_event(&state.store, Action::ListEventMembers, id, user.id)?;
    Ok(Json(state.store.members(ResourceKind::Event, id, user.id)?))
}

/// GET /events/:id/not-invited
async fn not_invited_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    authorize_event(&state.store, Action::ListEventMembers, id, user.id)?;
    Ok(Json(state.store.users_without_membership(ResourceKind::Event, id)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub email: String,
    /// The invitee's calendar to place the event in once confirmed.
    pub calendar_id: Option<i64>,
}

/// POST /events/:id/invite - Invite a user to an event
async fn share_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<ShareRequest>,
) -> Result<StatusCode, AppError> {
    check_email(&req.email)?;
    state
        .invitations
        .share_event(id, &user, &req.email, req.calendar_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /events/invite-confirm/:token - Accept an event invitation
async fn confirm_event(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    state.invitations.confirm_event(&token)?;
    Ok(StatusCode::NO_CONTENT)
}
