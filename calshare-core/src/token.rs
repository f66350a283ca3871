//! Signed, time-bound tokens.
//!
//! Tokens are compact HS256 JWTs: `base64url(header).base64url(claims).base64url(sig)`
//! with no padding. Every claim set names its audience and expiry, so an
//! access token can never be redeemed as an invitation or an email
//! confirmation, and vice versa.
//!
//! Invitation tokens are not stored anywhere. A valid token can be redeemed
//! any number of times until it expires; redemption is idempotent.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token format")]
    Malformed,
    #[error("Unsupported token header")]
    UnsupportedHeader,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Token was issued for a different purpose")]
    WrongAudience,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token claims: {0}")]
    Claims(String),
    #[error("Invalid signing key")]
    InvalidKey,
}

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Audience {
    Access,
    CalendarInvite,
    EventInvite,
    EmailConfirm,
}

/// Claims carried by a token type.
pub trait Claims: Serialize + DeserializeOwned {
    const AUDIENCE: Audience;
}

/// Session token presented as `Authorization: Bearer ...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: i64,
    pub login: String,
}

impl Claims for AccessClaims {
    const AUDIENCE: Audience = Audience::Access;
}

/// Invitation to confirm a pending calendar membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInvite {
    pub user_id: i64,
    pub calendar_id: i64,
}

impl Claims for CalendarInvite {
    const AUDIENCE: Audience = Audience::CalendarInvite;
}

/// Invitation to confirm a pending event membership. `calendar_id` is the
/// invitee's calendar the event gets linked into on confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInvite {
    pub user_id: i64,
    pub event_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<i64>,
}

impl Claims for EventInvite {
    const AUDIENCE: Audience = Audience::EventInvite;
}

/// Proof that whoever holds it can read mail sent to the account's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfirmation {
    pub user_id: i64,
}

impl Claims for EmailConfirmation {
    const AUDIENCE: Audience = Audience::EmailConfirm;
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    aud: Audience,
    exp: i64,
    #[serde(flatten)]
    claims: T,
}

/// Issues and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        TokenSigner {
            secret: secret.into(),
        }
    }

    /// Sign `claims`, valid for `ttl` from now.
    pub fn issue<T: Claims>(&self, claims: &T, ttl: Duration) -> Result<String, TokenError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.issue_with_expiry(claims, Utc::now().timestamp().saturating_add(ttl))
    }

    /// Sign `claims` with an absolute expiry (unix seconds).
    pub fn issue_with_expiry<T: Claims>(&self, claims: &T, exp: i64) -> Result<String, TokenError> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let envelope = Envelope {
            aud: T::AUDIENCE,
            exp,
            claims,
        };

        let header_json =
            serde_json::to_vec(&header).map_err(|e| TokenError::Claims(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(&envelope).map_err(|e| TokenError::Claims(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&signing_input)?.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify signature, audience and expiry, and return the claims.
    pub fn verify<T: Claims>(&self, token: &str) -> Result<T, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// As [`TokenSigner::verify`], with an explicit "now" in unix seconds.
    pub fn verify_at<T: Claims>(&self, token: &str, now: i64) -> Result<T, TokenError> {
        let token = token.trim();
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = serde_json::from_slice(&b64_decode(header_b64)?)
            .map_err(|_| TokenError::Malformed)?;
        if header.alg != "HS256" || !header.typ.eq_ignore_ascii_case("JWT") {
            return Err(TokenError::UnsupportedHeader);
        }

        let signature = b64_decode(sig_b64)?;
        self.mac(&format!("{header_b64}.{claims_b64}"))?
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let envelope: Envelope<serde_json::Value> =
            serde_json::from_slice(&b64_decode(claims_b64)?).map_err(|_| TokenError::Malformed)?;
        if envelope.aud != T::AUDIENCE {
            return Err(TokenError::WrongAudience);
        }
        if envelope.exp <= now {
            return Err(TokenError::Expired);
        }

        serde_json::from_value(envelope.claims).map_err(|e| TokenError::Claims(e.to_string()))
    }

    fn mac(&self, signing_input: &str) -> Result<Hmac<Sha256>, TokenError> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }
}

fn b64_decode(s: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(s.as_bytes())
        .map_err(|_| TokenError::Malformed)
}
