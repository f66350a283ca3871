//! User accounts.

use serde::{Deserialize, Serialize};

/// Public view of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
}

/// A user row together with its stored password material.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    /// Hex-encoded PBKDF2 output.
    pub password_hash: String,
    /// Hex-encoded per-user salt.
    pub password_salt: String,
    pub email_confirmed: bool,
}

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub password: String,
}

/// Minimal user view for "who can still be invited" lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
}
