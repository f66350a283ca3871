//! Membership join rows linking users to calendars and events.

use serde::Serialize;

use crate::role::Role;

/// The kind of resource a membership points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Calendar,
    Event,
}

impl ResourceKind {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            ResourceKind::Calendar => "user_calendars",
            ResourceKind::Event => "user_events",
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            ResourceKind::Calendar => "calendar_id",
            ResourceKind::Event => "event_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Calendar => "calendar",
            ResourceKind::Event => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user_id: i64,
    pub kind: ResourceKind,
    pub resource_id: i64,
    pub role: Role,
    pub is_confirmed: bool,
}

/// Another user's membership on a resource, for the "invited" lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub role: Role,
    pub is_confirmed: bool,
}
