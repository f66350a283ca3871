//! Authorization checks.
//!
//! Every calendar or event operation first resolves the caller's membership
//! on the target resource. No membership at all is reported as `NotFound`
//! (the caller cannot tell a foreign resource from a missing one); a
//! membership with the wrong role is `Forbidden`.
//!
//! Pending (unconfirmed) memberships pass the check: confirmation gates what
//! shows up in listings, not what a member may do.

use crate::error::{CalShareError, CalShareResult};
use crate::membership::{Membership, ResourceKind};
use crate::role::{Action, Role};
use crate::store::Store;

/// Check that `actor_id` holds one of `allowed` on the resource, returning
/// the membership so callers can branch on the role.
pub fn check_action(
    store: &Store,
    kind: ResourceKind,
    resource_id: i64,
    actor_id: i64,
    allowed: &[Role],
) -> CalShareResult<Membership> {
    let Some(membership) = store.find_membership(kind, actor_id, resource_id)? else {
        tracing::debug!(
            user_id = actor_id,
            resource_id,
            kind = kind.label(),
            "authorization denied: no membership"
        );
        return Err(CalShareError::NotFound(format!(
            "The {} with id {} was not found.",
            kind.label(),
            resource_id
        )));
    };

    if !allowed.contains(&membership.role) {
        tracing::debug!(
            user_id = actor_id,
            resource_id,
            kind = kind.label(),
            role = %membership.role,
            "authorization denied: insufficient role"
        );
        return Err(CalShareError::Forbidden(format!(
            "You do not have permission to perform this action on the {}.",
            kind.label()
        )));
    }

    Ok(membership)
}

/// [`check_action`] with the role set taken from the capability table.
pub fn authorize(
    store: &Store,
    action: Action,
    kind: ResourceKind,
    resource_id: i64,
    actor_id: i64,
) -> CalShareResult<Membership> {
    check_action(store, kind, resource_id, actor_id, action.allowed_roles())
}

pub fn authorize_calendar(
    store: &Store,
    action: Action,
    calendar_id: i64,
    actor_id: i64,
) -> CalShareResult<Membership> {
    authorize(store, action, ResourceKind::Calendar, calendar_id, actor_id)
}

pub fn authorize_event(
    store: &Store,
    action: Action,
    event_id: i64,
    actor_id: i64,
) -> CalShareResult<Membership> {
    authorize(store, action, ResourceKind::Event, event_id, actor_id)
}
