//! Accounts: registration, email confirmation and login sessions.
//!
//! A session pairs a short-lived access token with an opaque refresh token.
//! Only the SHA-256 of a refresh token is stored. Refreshing swaps it for a
//! new one and logging out deletes it, so every refresh token works once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};

use crate::config::TokenConfig;
use crate::error::{CalShareError, CalShareResult};
use crate::mailer::{MailTemplate, Mailer};
use crate::password::{PasswordHash, hash_password, verify_password};
use crate::store::Store;
use crate::token::{AccessClaims, EmailConfirmation, TokenSigner};
use crate::user::{NewUser, User};
use crate::validation::validate_new_user;

const REFRESH_TOKEN_BYTES: usize = 32;

/// Token lifetimes used by [`Accounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountTtls {
    pub access: Duration,
    pub refresh: Duration,
    /// Lifetime of the link in the confirmation email.
    pub confirm: Duration,
}

impl AccountTtls {
    pub fn from_config(config: &TokenConfig) -> CalShareResult<Self> {
        Ok(AccountTtls {
            access: config.access_ttl()?,
            refresh: config.refresh_ttl()?,
            confirm: config.invite_ttl()?,
        })
    }
}

/// Tokens handed out on login and refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

pub struct Accounts {
    store: Arc<Store>,
    mailer: Arc<dyn Mailer>,
    signer: Arc<TokenSigner>,
    ttls: AccountTtls,
    client_url: String,
}

fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_refresh_token() -> CalShareResult<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|e| CalShareError::Config(format!("Failed to generate refresh token: {e}")))?;
    Ok(hex::encode(bytes))
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> CalShareResult<DateTime<Utc>> {
    let ttl = TimeDelta::from_std(ttl)
        .map_err(|e| CalShareError::Config(format!("Invalid refresh lifetime: {e}")))?;
    Ok(now + ttl)
}

fn invalid_refresh() -> CalShareError {
    CalShareError::Unauthorized("The refresh token is invalid or expired.".to_string())
}

impl Accounts {
    pub fn new(
        store: Arc<Store>,
        mailer: Arc<dyn Mailer>,
        signer: Arc<TokenSigner>,
        ttls: AccountTtls,
        client_url: impl Into<String>,
    ) -> Self {
        Accounts {
            store,
            mailer,
            signer,
            ttls,
            client_url: client_url.into(),
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.ttls.refresh
    }

    /// Register an account and mail it a confirmation link.
    pub async fn register(&self, req: &NewUser) -> CalShareResult<User> {
        let user = self.create_account(req)?;
        self.send_confirmation(&user).await;
        Ok(user)
    }

    /// Validate and store a new account. Hashing the password is CPU bound;
    /// async callers should run this on a blocking thread.
    pub fn create_account(&self, req: &NewUser) -> CalShareResult<User> {
        validate_new_user(req)?;

        if self.store.user_exists(&req.login, &req.email)? {
            return Err(CalShareError::Conflict(
                "A user with this login or email already exists.".to_string(),
            ));
        }

        let password = hash_password(&req.password)?;
        let user = self
            .store
            .create_user(&req.login, &req.email, &password.hash, &password.salt)?;

        tracing::info!(user_id = user.id, login = %user.login, "user registered");
        Ok(user)
    }

    /// Mail the account its confirmation link. Failures are logged; the
    /// account stays unconfirmed until a link gets through.
    pub async fn send_confirmation(&self, user: &User) {
        let token = match self.signer.issue(
            &EmailConfirmation { user_id: user.id },
            self.ttls.confirm,
        ) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "failed to sign email confirmation");
                return;
            }
        };

        let message =
            MailTemplate::EmailConfirm.render(&user.email, &user.login, &self.client_url, &token);
        if let Err(e) = self.mailer.send(&message).await {
            tracing::warn!(to = %user.email, error = %e, "failed to send email confirmation");
        }
    }

    /// Redeem an email confirmation link. Confirming twice is harmless.
    pub fn confirm_email(&self, token: &str) -> CalShareResult<()> {
        let claims: EmailConfirmation = self.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected email confirmation token");
            CalShareError::BadRequest("The confirm token is invalid.".to_string())
        })?;

        if !self.store.confirm_email(claims.user_id)? {
            return Err(CalShareError::NotFound(
                "The user no longer exists.".to_string(),
            ));
        }

        tracing::info!(user_id = claims.user_id, "email confirmed");
        Ok(())
    }

    /// Check credentials and open a session. `login` may be the login name
    /// or the email address.
    pub fn login(&self, login: &str, password: &str) -> CalShareResult<Session> {
        let invalid = || CalShareError::Unauthorized("Invalid login or password.".to_string());

        let credentials = self.store.find_credentials(login)?.ok_or_else(invalid)?;
        let stored = PasswordHash {
            hash: credentials.password_hash,
            salt: credentials.password_salt,
        };
        if !verify_password(password, &stored) {
            tracing::debug!(login, "password mismatch");
            return Err(invalid());
        }

        if !credentials.email_confirmed {
            return Err(CalShareError::Forbidden(
                "Please confirm your email address before logging in.".to_string(),
            ));
        }

        let user = credentials.user;
        let refresh_token = new_refresh_token()?;
        let expires_at = expiry_after(Utc::now(), self.ttls.refresh)?;
        self.store
            .insert_session(user.id, &hash_refresh_token(&refresh_token), expires_at)?;

        tracing::info!(user_id = user.id, "session started");
        Ok(Session {
            access_token: self.issue_access(&user)?,
            refresh_token,
            user,
        })
    }

    /// Trade a refresh token for a new session. The presented token is
    /// spent either way.
    pub fn refresh(&self, refresh_token: &str) -> CalShareResult<Session> {
        let next = new_refresh_token()?;
        let now = Utc::now();

        let user_id = self
            .store
            .rotate_session(
                &hash_refresh_token(refresh_token),
                &hash_refresh_token(&next),
                now,
                expiry_after(now, self.ttls.refresh)?,
            )?
            .ok_or_else(invalid_refresh)?;
        let user = self.store.find_user(user_id)?.ok_or_else(invalid_refresh)?;

        Ok(Session {
            access_token: self.issue_access(&user)?,
            refresh_token: next,
            user,
        })
    }

    /// End the session behind a refresh token. Unknown tokens are ignored.
    pub fn logout(&self, refresh_token: &str) -> CalShareResult<()> {
        if self.store.delete_session(&hash_refresh_token(refresh_token))? {
            tracing::info!("session ended");
        }
        Ok(())
    }

    fn issue_access(&self, user: &User) -> CalShareResult<String> {
        self.signer
            .issue(
                &AccessClaims {
                    user_id: user.id,
                    login: user.login.clone(),
                },
                self.ttls.access,
            )
            .map_err(|e| CalShareError::Serialization(e.to_string()))
    }
}
