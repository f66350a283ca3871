//! Shared constants.

use std::ops::RangeInclusive;

pub const DEFAULT_CALENDAR_COLOR: &str = "#7399F2";
pub const HOLIDAY_COLOR: &str = "#F6AD55";

/// Calendar name reserved for the holiday overlay shown next to real calendars.
pub const RESERVED_CALENDAR_NAME: &str = "Holidays";

pub const LOGIN_LENGTH: RangeInclusive<usize> = 4..=20;
pub const PASSWORD_LENGTH: RangeInclusive<usize> = 8..=20;
pub const CALENDAR_NAME_LENGTH: RangeInclusive<usize> = 5..=100;
pub const CALENDAR_DESCRIPTION_LENGTH: RangeInclusive<usize> = 0..=250;
pub const EVENT_NAME_LENGTH: RangeInclusive<usize> = 5..=20;
pub const EVENT_CONTENT_LENGTH: RangeInclusive<usize> = 0..=500;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const MIN_TOKEN_SECRET_LEN: usize = 32;
