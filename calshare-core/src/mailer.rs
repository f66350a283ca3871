//! Invitation and account email dispatch.
//!
//! The workflow only sees the [`Mailer`] trait. The server picks
//! [`HttpMailer`] when a transactional mail API is configured and falls back
//! to [`LogMailer`] otherwise, so a development setup still prints the
//! confirmation links.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MailConfig;
use crate::error::{CalShareError, CalShareResult};

/// A rendered email ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    CalendarInviteConfirm,
    EventInviteConfirm,
    EmailConfirm,
}

impl MailTemplate {
    fn subject(&self) -> &'static str {
        match self {
            MailTemplate::CalendarInviteConfirm => "You have been invited to a calendar",
            MailTemplate::EventInviteConfirm => "You have been invited to an event",
            MailTemplate::EmailConfirm => "Confirm your email address",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            MailTemplate::CalendarInviteConfirm => "calendars/invite-confirm",
            MailTemplate::EventInviteConfirm => "events/invite-confirm",
            MailTemplate::EmailConfirm => "auth/confirm-email",
        }
    }

    /// Render the message sent to `to`. `login` is the inviter for
    /// invitations and the new account's own login for email confirmation.
    pub fn render(&self, to: &str, login: &str, client_url: &str, token: &str) -> MailMessage {
        let link = format!(
            "{}/{}/{}",
            client_url.trim_end_matches('/'),
            self.path(),
            token
        );

        let (html, text) = match self {
            MailTemplate::EmailConfirm => (
                format!(
                    "<p>Welcome to calshare, <b>{login}</b>.</p>\
                     <p><a href=\"{link}\">Confirm your email address</a></p>"
                ),
                format!("Welcome to calshare, {login}.\nConfirm your email address: {link}\n"),
            ),
            MailTemplate::CalendarInviteConfirm | MailTemplate::EventInviteConfirm => {
                let noun = match self {
                    MailTemplate::CalendarInviteConfirm => "calendar",
                    _ => "event",
                };
                (
                    format!(
                        "<p><b>{login}</b> shared a {noun} with you.</p>\
                         <p><a href=\"{link}\">Accept the invitation</a></p>"
                    ),
                    format!("{login} shared a {noun} with you.\nAccept the invitation: {link}\n"),
                )
            }
        };

        MailMessage {
            to: to.to_string(),
            subject: self.subject().to_string(),
            html,
            text,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> CalShareResult<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody {
    sender: EmailAddress,
    to: Vec<EmailAddress>,
    subject: String,
    html_content: String,
    text_content: String,
}

/// Sends mail through a Brevo-compatible transactional email API.
pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_email: String,
    sender_name: Option<String>,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Self {
        HttpMailer {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            sender_email: config.sender_email.clone(),
            sender_name: config.sender_name.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> CalShareResult<()> {
        let body = SendEmailBody {
            sender: EmailAddress {
                email: self.sender_email.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![EmailAddress {
                email: message.to.clone(),
                name: None,
            }],
            subject: message.subject.clone(),
            html_content: message.html.clone(),
            text_content: message.text.clone(),
        };

        let resp = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CalShareError::Mail(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(CalShareError::Mail(format!(
            "Mail API send failed (status={status}): {body}"
        )))
    }
}

/// Logs messages instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> CalShareResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "mail transport not configured; message follows\n{}",
            message.text
        );
        Ok(())
    }
}

/// Keeps every message in memory. Used by tests that need to read the
/// confirmation token back out of an invitation.
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: &MailMessage) -> CalShareResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }
}

/// Extract the confirmation token from a rendered invitation or email
/// confirmation.
pub fn token_from_message(message: &MailMessage) -> Option<&str> {
    ["/invite-confirm/", "/confirm-email/"].iter().find_map(|marker| {
        let start = message.text.find(marker)? + marker.len();
        message.text[start..].split_whitespace().next()
    })
}
