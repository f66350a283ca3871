//! Relational store backed by SQLite.
//!
//! Users, calendars and events live in their own tables; the three join
//! tables (`user_calendars`, `user_events`, `calendar_events`) carry the
//! many-to-many links, and `sessions` holds hashed refresh tokens.
//! Membership tables are keyed on `(user, resource)` so a user can hold at
//! most one role per resource.

mod calendars;
mod events;
mod memberships;
mod sessions;
mod users;

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use rusqlite::types::Type;

use crate::error::{CalShareError, CalShareResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    password_salt TEXT NOT NULL,
    email_confirmed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS calendars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    color TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    content TEXT,
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL,
    color TEXT NOT NULL,
    type TEXT NOT NULL CHECK (type IN ('arrangement', 'reminder', 'task'))
);

CREATE TABLE IF NOT EXISTS user_calendars (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('admin', 'moderator', 'guest')),
    is_confirmed INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (user_id, calendar_id)
);

CREATE TABLE IF NOT EXISTS user_events (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('admin', 'moderator', 'guest')),
    is_confirmed INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (user_id, event_id)
);

CREATE TABLE IF NOT EXISTS calendar_events (
    calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    PRIMARY KEY (calendar_id, event_id)
);

CREATE INDEX IF NOT EXISTS idx_user_calendars_calendar ON user_calendars(calendar_id);
CREATE INDEX IF NOT EXISTS idx_user_events_event ON user_events(event_id);
CREATE INDEX IF NOT EXISTS idx_calendar_events_event ON calendar_events(event_id);
";

/// Parse an enum stored as text (roles, event types).
fn parse_text<T>(raw: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = CalShareError>,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Handle to the calshare database.
///
/// SQLite connections are not `Sync`, so the connection sits behind a mutex;
/// each store method holds the lock for the duration of one statement or
/// one transaction and never across an `.await`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> CalShareResult<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> CalShareResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CalShareResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("database schema initialized");
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite itself in a bad
        // state, so a poisoned mutex is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn table_exists(&self, table_name: &str) -> bool {
        let result: rusqlite::Result<i32> = self.conn().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        );
        result.unwrap_or(0) > 0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::calendar::{Calendar, NewCalendar};
    use crate::user::User;

    pub fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    pub fn user(store: &Store, login: &str) -> User {
        store
            .create_user(login, &format!("{login}@example.com"), "hash", "salt")
            .unwrap()
    }

    pub fn calendar(store: &Store, owner: &User, name: &str) -> Calendar {
        store
            .create_calendar(
                owner.id,
                &NewCalendar {
                    name: name.to_string(),
                    description: None,
                    color: None,
                },
            )
            .unwrap()
    }
}
