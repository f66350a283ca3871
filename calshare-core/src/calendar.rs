//! Calendar records.

use serde::{Deserialize, Serialize};

use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
}

/// A calendar as seen by one member, tagged with that member's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarWithRole {
    #[serde(flatten)]
    pub calendar: Calendar,
    pub role: Role,
}

/// Body of `POST /calendars`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendar {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Body of `PUT /calendars/:id`. Color is mandatory on update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarUpdate {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
}
