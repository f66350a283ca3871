use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::Store;
use crate::error::CalShareResult;

impl Store {
    /// Record a refresh token (by hash) for the user.
    pub fn insert_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> CalShareResult<()> {
        self.conn().execute(
            "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token_hash, user_id, expires_at],
        )?;
        Ok(())
    }

    /// Swap a refresh token for a new one.
    ///
    /// The old row is removed whether or not it is still valid, so a token
    /// works at most once. Returns the owner when the old token existed and
    /// had not expired at `now`; only then is the new token stored.
    pub fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> CalShareResult<Option<i64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current: Option<(i64, DateTime<Utc>)> = tx
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
                [old_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        tx.execute("DELETE FROM sessions WHERE token_hash = ?1", [old_hash])?;

        let owner = match current {
            Some((user_id, expiry)) if expiry > now => {
                tx.execute(
                    "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                    params![new_hash, user_id, expires_at],
                )?;
                Some(user_id)
            }
            _ => None,
        };

        tx.commit()?;
        Ok(owner)
    }

    /// Forget a refresh token. Returns `false` when it was unknown.
    pub fn delete_session(&self, token_hash: &str) -> CalShareResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?;
        Ok(deleted > 0)
    }
}
