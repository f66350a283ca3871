//! Event records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalShareError;
use crate::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Arrangement,
    Reminder,
    Task,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Arrangement => "arrangement",
            EventType::Reminder => "reminder",
            EventType::Task => "task",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CalShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arrangement" => Ok(EventType::Arrangement),
            "reminder" => Ok(EventType::Reminder),
            "task" => Ok(EventType::Task),
            other => Err(CalShareError::Validation(format!(
                "Unknown event type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub content: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub color: String,
    #[serde(rename = "type")]
    pub kind: EventType,
}

/// An event as listed for one member: which of the requested calendars it
/// came through, and the member's role on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListing {
    #[serde(flatten)]
    pub event: Event,
    pub calendar_id: i64,
    pub role: Role,
}

/// Body of `POST /calendars/:id/events` and `PUT /calendars/:id/events/:eventId`.
/// A missing color falls back to the owning calendar's color on create.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub name: String,
    pub content: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub color: Option<String>,
    #[serde(rename = "type")]
    pub kind: EventType,
}
