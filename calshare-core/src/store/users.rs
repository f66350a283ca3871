use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use crate::error::CalShareResult;
use crate::membership::ResourceKind;
use crate::user::{User, UserCredentials, UserSummary};

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        login: row.get("login")?,
        email: row.get("email")?,
    })
}

impl Store {
    pub fn create_user(
        &self,
        login: &str,
        email: &str,
        password_hash: &str,
        password_salt: &str,
    ) -> CalShareResult<User> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (login, email, password_hash, password_salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![login, email, password_hash, password_salt, Utc::now()],
        )?;

        Ok(User {
            id: conn.last_insert_rowid(),
            login: login.to_string(),
            email: email.to_string(),
        })
    }

    pub fn find_user(&self, id: i64) -> CalShareResult<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, login, email FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> CalShareResult<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, login, email FROM users WHERE email = ?1 COLLATE NOCASE",
                [email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Whether `login` or `email` is already taken by some account.
    pub fn user_exists(&self, login: &str, email: &str) -> CalShareResult<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE login = ?1 OR email = ?2 COLLATE NOCASE",
            [login, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Look up stored credentials by login name or email address.
    ///
    /// Logins never contain '@', so input with one is matched against
    /// emails only and input without one against logins only.
    pub fn find_credentials(&self, login_or_email: &str) -> CalShareResult<Option<UserCredentials>> {
        let column = if login_or_email.contains('@') {
            "email = ?1 COLLATE NOCASE"
        } else {
            "login = ?1"
        };
        let sql = format!(
            "SELECT id, login, email, password_hash, password_salt, email_confirmed
             FROM users WHERE {column}"
        );

        let credentials = self
            .conn()
            .query_row(&sql, [login_or_email], |row| {
                Ok(UserCredentials {
                    user: user_from_row(row)?,
                    password_hash: row.get("password_hash")?,
                    password_salt: row.get("password_salt")?,
                    email_confirmed: row.get("email_confirmed")?,
                })
            })
            .optional()?;
        Ok(credentials)
    }

    /// Mark the user's email address as confirmed. Returns `false` when the
    /// user no longer exists.
    pub fn confirm_email(&self, user_id: i64) -> CalShareResult<bool> {
        let updated = self
            .conn()
            .execute("UPDATE users SET email_confirmed = 1 WHERE id = ?1", [user_id])?;
        Ok(updated > 0)
    }

    /// Users holding no membership of any kind on the given resource.
    pub fn users_without_membership(
        &self,
        kind: ResourceKind,
        resource_id: i64,
    ) -> CalShareResult<Vec<UserSummary>> {
        let sql = format!(
            "SELECT id, email FROM users
             WHERE id NOT IN (SELECT user_id FROM {table} WHERE {column} = ?1)
             ORDER BY id",
            table = kind.table(),
            column = kind.column(),
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map([resource_id], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }
}
