//! Request field validation.
//!
//! Runs before any handler logic touches the store. Failures become
//! `CalShareError::Validation` (HTTP 400) with a message naming the field.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use crate::calendar::{CalendarUpdate, NewCalendar};
use crate::constants::{
    CALENDAR_DESCRIPTION_LENGTH, CALENDAR_NAME_LENGTH, EVENT_CONTENT_LENGTH, EVENT_NAME_LENGTH,
    LOGIN_LENGTH, PASSWORD_LENGTH, RESERVED_CALENDAR_NAME,
};
use crate::error::{CalShareError, CalShareResult};
use crate::event::EventDraft;
use crate::user::NewUser;

static COLOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([a-fA-F0-9]{6}|[a-fA-F0-9]{3})$").expect("valid regex"));

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

fn invalid(msg: impl Into<String>) -> CalShareError {
    CalShareError::Validation(msg.into())
}

fn check_length(field: &str, value: &str, bounds: RangeInclusive<usize>) -> CalShareResult<()> {
    let len = value.chars().count();
    if bounds.contains(&len) {
        return Ok(());
    }
    Err(invalid(format!(
        "\"{field}\" length must be between {} and {} characters",
        bounds.start(),
        bounds.end()
    )))
}

pub fn check_color(field: &str, value: &str) -> CalShareResult<()> {
    if COLOR_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(invalid(format!(
            "\"{field}\" must be a hex color like #7399F2"
        )))
    }
}

pub fn check_email(value: &str) -> CalShareResult<()> {
    if EMAIL_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(invalid("\"email\" must be a valid email"))
    }
}

/// The holiday overlay is displayed as a pseudo-calendar, so no real
/// calendar may take its name.
pub fn check_calendar_name(name: &str) -> CalShareResult<()> {
    if name.trim().eq_ignore_ascii_case(RESERVED_CALENDAR_NAME) {
        return Err(CalShareError::BadRequest(format!(
            "The calendar name \"{RESERVED_CALENDAR_NAME}\" is reserved."
        )));
    }
    Ok(())
}

pub fn validate_new_user(user: &NewUser) -> CalShareResult<()> {
    check_length("login", &user.login, LOGIN_LENGTH)?;
    // Sign-in accepts a login or an email; '@' tells them apart.
    if user.login.contains('@') {
        return Err(invalid("\"login\" must not contain '@'"));
    }
    check_email(&user.email)?;
    check_length("password", &user.password, PASSWORD_LENGTH)
}

fn validate_description(description: Option<&str>) -> CalShareResult<()> {
    match description {
        Some(d) => check_length("description", d, CALENDAR_DESCRIPTION_LENGTH),
        None => Ok(()),
    }
}

pub fn validate_new_calendar(calendar: &NewCalendar) -> CalShareResult<()> {
    check_length("name", &calendar.name, CALENDAR_NAME_LENGTH)?;
    validate_description(calendar.description.as_deref())?;
    if let Some(color) = &calendar.color {
        check_color("color", color)?;
    }
    check_calendar_name(&calendar.name)
}

pub fn validate_calendar_update(update: &CalendarUpdate) -> CalShareResult<()> {
    check_length("name", &update.name, CALENDAR_NAME_LENGTH)?;
    validate_description(update.description.as_deref())?;
    check_color("color", &update.color)?;
    check_calendar_name(&update.name)
}

pub fn validate_event_draft(draft: &EventDraft) -> CalShareResult<()> {
    check_length("name", &draft.name, EVENT_NAME_LENGTH)?;
    if let Some(content) = &draft.content {
        check_length("content", content, EVENT_CONTENT_LENGTH)?;
    }
    if let Some(color) = &draft.color {
        check_color("color", color)?;
    }
    if draft.end_at < draft.start_at {
        return Err(invalid("\"endAt\" must not be before \"startAt\""));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use chrono::{Duration, Utc};

    fn calendar(name: &str, color: Option<&str>) -> NewCalendar {
        NewCalendar {
            name: name.to_string(),
            description: Some(String::new()),
            color: color.map(str::to_string),
        }
    }

    #[test]
    fn accepts_short_and_long_hex_colors() {
        assert!(check_color("color", "#fff").is_ok());
        assert!(check_color("color", "#7399F2").is_ok());
        assert!(check_color("color", "7399F2").is_err());
        assert!(check_color("color", "#12345").is_err());
        assert!(check_color("color", "#ggg").is_err());
    }

    #[test]
    fn enforces_calendar_name_bounds() {
        assert!(validate_new_calendar(&calendar("Work", None)).is_err());
        assert!(validate_new_calendar(&calendar("Work stuff", None)).is_ok());
        assert!(validate_new_calendar(&calendar(&"x".repeat(101), None)).is_err());
        assert!(validate_new_calendar(&calendar("Work stuff", Some("blue"))).is_err());
    }

    #[test]
    fn rejects_reserved_calendar_name() {
        let err = validate_new_calendar(&calendar("holidays", None)).unwrap_err();
        assert!(matches!(err, CalShareError::BadRequest(_)));
    }

    #[test]
    fn validates_registration() {
        let ok = NewUser {
            login: "alice".into(),
            email: "alice@example.com".into(),
            password: "secret-pass".into(),
        };
        assert!(validate_new_user(&ok).is_ok());

        let bad_email = NewUser {
            email: "not-an-email".into(),
            ..ok.clone()
        };
        assert!(validate_new_user(&bad_email).is_err());

        let short_password = NewUser {
            password: "short".into(),
            ..ok.clone()
        };
        assert!(validate_new_user(&short_password).is_err());

        let email_like_login = NewUser {
            login: "bo@b.io".into(),
            ..ok
        };
        assert!(matches!(
            validate_new_user(&email_like_login),
            Err(CalShareError::Validation(ref m)) if m.contains('@')
        ));
    }

    #[test]
    fn event_must_not_end_before_it_starts() {
        let start = Utc::now();
        let mut draft = EventDraft {
            name: "Standup".into(),
            content: None,
            start_at: start,
            end_at: start + Duration::hours(1),
            color: None,
            kind: EventType::Arrangement,
        };
        assert!(validate_event_draft(&draft).is_ok());

        draft.end_at = start - Duration::minutes(1);
        assert!(validate_event_draft(&draft).is_err());

        draft.end_at = start;
        draft.name = "Sync".into();
        assert!(validate_event_draft(&draft).is_err());
    }
}
