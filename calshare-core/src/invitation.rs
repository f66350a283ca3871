//! Share and confirm workflow for calendars and events.
//!
//! Sharing creates a pending membership, signs an invitation token and mails
//! it to the invitee. Confirming verifies the token, flips the membership to
//! confirmed and applies the cascading grants:
//!
//! - calendar: the invitee becomes a guest on every event already in the
//!   calendar;
//! - event: the event is linked into the invitee's calendar named in the
//!   token.
//!
//! A failed email does not undo the membership; the invitee stays listed as
//! pending until they confirm.

use std::sync::Arc;
use std::time::Duration;

use crate::authz::{authorize_calendar, authorize_event};
use crate::error::{CalShareError, CalShareResult};
use crate::mailer::{MailTemplate, Mailer};
use crate::membership::ResourceKind;
use crate::role::{Action, Role};
use crate::store::Store;
use crate::token::{CalendarInvite, EventInvite, TokenSigner};
use crate::user::User;

const INVALID_TOKEN: &str = "The confirm token is invalid.";

pub struct Invitations {
    store: Arc<Store>,
    mailer: Arc<dyn Mailer>,
    signer: Arc<TokenSigner>,
    ttl: Duration,
    client_url: String,
}

impl Invitations {
    pub fn new(
        store: Arc<Store>,
        mailer: Arc<dyn Mailer>,
        signer: Arc<TokenSigner>,
        ttl: Duration,
        client_url: impl Into<String>,
    ) -> Self {
        Invitations {
            store,
            mailer,
            signer,
            ttl,
            client_url: client_url.into(),
        }
    }

    /// Invite the user registered under `email` to moderate a calendar the
    /// inviter administers.
    pub async fn share_calendar(
        &self,
        calendar_id: i64,
        inviter: &User,
        email: &str,
    ) -> CalShareResult<()> {
        let invitee = self.invitee(email)?;
        authorize_calendar(&self.store, Action::ShareCalendar, calendar_id, inviter.id)?;

        if self
            .store
            .find_membership(ResourceKind::Calendar, invitee.id, calendar_id)?
            .is_some()
        {
            return Err(CalShareError::Conflict(
                "This user already has access to the calendar.".to_string(),
            ));
        }

        self.store.insert_membership(
            ResourceKind::Calendar,
            invitee.id,
            calendar_id,
            Role::Moderator,
            false,
        )?;

        let token = self
            .signer
            .issue(
                &CalendarInvite {
                    user_id: invitee.id,
                    calendar_id,
                },
                self.ttl,
            )
            .map_err(|e| CalShareError::Serialization(e.to_string()))?;

        tracing::info!(
            calendar_id,
            inviter_id = inviter.id,
            invitee_id = invitee.id,
            "calendar shared"
        );
        self.deliver(MailTemplate::CalendarInviteConfirm, &invitee, inviter, &token)
            .await;
        Ok(())
    }

    /// Redeem a calendar invitation. Returns how many event memberships the
    /// cascade created.
    pub fn confirm_calendar(&self, token: &str) -> CalShareResult<usize> {
        let invite: CalendarInvite = self.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected calendar invite token");
            CalShareError::BadRequest(INVALID_TOKEN.to_string())
        })?;

        if !self
            .store
            .confirm_membership(ResourceKind::Calendar, invite.user_id, invite.calendar_id)?
        {
            return Err(CalShareError::NotFound(
                "The invitation no longer exists.".to_string(),
            ));
        }

        let enrolled = self
            .store
            .enroll_guest_in_calendar_events(invite.user_id, invite.calendar_id)?;

        tracing::info!(
            user_id = invite.user_id,
            calendar_id = invite.calendar_id,
            enrolled,
            "calendar invitation confirmed"
        );
        Ok(enrolled)
    }

    /// Invite a user to an event as a guest.
    ///
    /// `calendar_id` names the invitee's calendar the event lands in once
    /// confirmed. Without it the invitee's first moderated calendar is used,
    /// then their first administered one.
    pub async fn share_event(
        &self,
        event_id: i64,
        inviter: &User,
        email: &str,
        calendar_id: Option<i64>,
    ) -> CalShareResult<()> {
        let invitee = self.invitee(email)?;
        authorize_event(&self.store, Action::ShareEvent, event_id, inviter.id)?;

        if self
            .store
            .find_membership(ResourceKind::Event, invitee.id, event_id)?
            .is_some()
        {
            return Err(CalShareError::Conflict(
                "This user already has access to the event.".to_string(),
            ));
        }

        let target = self.target_calendar(invitee.id, calendar_id)?;

        self.store.insert_membership(
            ResourceKind::Event,
            invitee.id,
            event_id,
            Role::Guest,
            false,
        )?;

        let token = self
            .signer
            .issue(
                &EventInvite {
                    user_id: invitee.id,
                    event_id,
                    calendar_id: target,
                },
                self.ttl,
            )
            .map_err(|e| CalShareError::Serialization(e.to_string()))?;

        tracing::info!(
            event_id,
            inviter_id = inviter.id,
            invitee_id = invitee.id,
            calendar_id = ?target,
            "event shared"
        );
        self.deliver(MailTemplate::EventInviteConfirm, &invitee, inviter, &token)
            .await;
        Ok(())
    }

    /// Redeem an event invitation.
    pub fn confirm_event(&self, token: &str) -> CalShareResult<()> {
        let invite: EventInvite = self.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected event invite token");
            CalShareError::BadRequest(INVALID_TOKEN.to_string())
        })?;

        if !self
            .store
            .confirm_membership(ResourceKind::Event, invite.user_id, invite.event_id)?
        {
            return Err(CalShareError::NotFound(
                "The invitation no longer exists.".to_string(),
            ));
        }

        match invite.calendar_id {
            Some(calendar_id) => {
                // The invitee may have left the calendar since the invite was sent.
                if self
                    .store
                    .find_membership(ResourceKind::Calendar, invite.user_id, calendar_id)?
                    .is_some()
                {
                    self.store.link_event_to_calendar(calendar_id, invite.event_id)?;
                } else {
                    tracing::warn!(
                        user_id = invite.user_id,
                        calendar_id,
                        "invitee no longer belongs to target calendar; event not linked"
                    );
                }
            }
            None => tracing::debug!(
                user_id = invite.user_id,
                event_id = invite.event_id,
                "event invite has no target calendar"
            ),
        }

        tracing::info!(
            user_id = invite.user_id,
            event_id = invite.event_id,
            "event invitation confirmed"
        );
        Ok(())
    }

    fn invitee(&self, email: &str) -> CalShareResult<User> {
        self.store.find_user_by_email(email)?.ok_or_else(|| {
            CalShareError::NotFound(format!("The user with email {email} was not found."))
        })
    }

    fn target_calendar(&self, user_id: i64, requested: Option<i64>) -> CalShareResult<Option<i64>> {
        if let Some(calendar_id) = requested {
            return match self
                .store
                .find_membership(ResourceKind::Calendar, user_id, calendar_id)?
            {
                Some(_) => Ok(Some(calendar_id)),
                None => Err(CalShareError::NotFound(format!(
                    "The calendar with id {calendar_id} was not found."
                ))),
            };
        }

        if let Some(id) = self.store.first_calendar_with_role(user_id, Role::Moderator)? {
            return Ok(Some(id));
        }
        self.store.first_calendar_with_role(user_id, Role::Admin)
    }

    async fn deliver(&self, template: MailTemplate, invitee: &User, inviter: &User, token: &str) {
        let message = template.render(&invitee.email, &inviter.login, &self.client_url, token);
        if let Err(e) = self.mailer.send(&message).await {
            tracing::warn!(
                to = %invitee.email,
                error = %e,
                "failed to send invitation email; membership kept"
            );
        }
    }
}
