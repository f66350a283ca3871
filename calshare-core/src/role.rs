//! Membership roles and the per-action capability table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CalShareError;

/// Role a user holds on a calendar or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    Guest,
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::Admin, Role::Moderator, Role::Guest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CalShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "guest" => Ok(Role::Guest),
            other => Err(CalShareError::Validation(format!("Unknown role '{other}'"))),
        }
    }
}

/// Something a user may try to do to a calendar or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadCalendar,
    ListCalendarMembers,
    UpdateCalendar,
    DeleteCalendar,
    ShareCalendar,
    CreateEvent,
    ReadEvent,
    ListEventMembers,
    UpdateEvent,
    DeleteEvent,
    ShareEvent,
}

impl Action {
    /// Roles that may perform this action.
    pub fn allowed_roles(&self) -> &'static [Role] {
        use Role::*;

        match self {
            Action::ReadCalendar
            | Action::ListCalendarMembers
            | Action::ReadEvent
            | Action::ListEventMembers => Role::ALL,
            Action::UpdateCalendar
            | Action::DeleteCalendar
            | Action::ShareCalendar
            | Action::UpdateEvent
            | Action::ShareEvent => &[Admin],
            Action::CreateEvent => &[Admin, Moderator],
            Action::DeleteEvent => &[Admin, Guest],
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }
}
