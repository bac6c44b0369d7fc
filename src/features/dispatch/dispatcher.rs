//! # Feature: Dispatcher
//!
//! Sends one personalized message to one contact, then applies the status
//! change and writes exactly one dispatch record for the attempt.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Manual and automatic dispatch, per-contact locking, address validation
//! - 1.1.0: Follow-up sends re-checked and marked fired under the contact lock

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use super::delivery::Delivery;
use super::locks::ContactLocks;
use crate::core::error::{OutreachError, OutreachResult};
use crate::core::models::{Contact, ContactStatus, Template};
use crate::database::Database;
use crate::features::activity::{ActivityRecorder, DispatchRecord, DispatchStatus};
use crate::features::personalization::PersonalizedMessage;

static ADDRESS_PATTERN: OnceLock<Regex> = OnceLock::new();

fn address_pattern() -> &'static Regex {
    ADDRESS_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid address regex")
    })
}

/// Check that `address` looks deliverable
pub fn validate_address(address: &str) -> OutreachResult<()> {
    let address = address.trim();
    if address.is_empty() {
        return Err(OutreachError::Validation(
            "contact has no email address".to_string(),
        ));
    }
    if !address_pattern().is_match(address) {
        return Err(OutreachError::Validation(format!(
            "invalid email address: {address}"
        )));
    }
    Ok(())
}

/// A message that was handed to the delivery transport
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReceipt {
    pub contact_id: i64,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    /// Contact status after the send
    pub status: ContactStatus,
    /// False if the message went out but the new status could not be stored
    pub state_saved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DispatchMode {
    Manual,
    Automatic,
    /// Sending follow-up `schedule_id`, which must still be the contact's pending one
    FollowUp { schedule_id: i64 },
}

#[derive(Clone)]
pub struct Dispatcher {
    database: Database,
    delivery: Arc<dyn Delivery>,
    recorder: ActivityRecorder,
    locks: ContactLocks,
}

impl Dispatcher {
    pub fn new(database: Database, delivery: Arc<dyn Delivery>, locks: ContactLocks) -> Self {
        Self {
            recorder: ActivityRecorder::new(database.clone()),
            database,
            delivery,
            locks,
        }
    }

    pub fn locks(&self) -> &ContactLocks {
        &self.locks
    }

    /// User-initiated send. Allowed for any status.
    pub async fn dispatch(
        &self,
        contact: &Contact,
        message: &PersonalizedMessage,
        template: &Template,
    ) -> OutreachResult<DispatchReceipt> {
        self.dispatch_inner(contact.id, message, template.id, DispatchMode::Manual)
            .await
    }

    /// Send on behalf of a batch. Refuses replied/closed contacts
    /// with [`OutreachError::TerminalContact`].
    pub async fn dispatch_automatic(
        &self,
        contact: &Contact,
        message: &PersonalizedMessage,
        template: &Template,
    ) -> OutreachResult<DispatchReceipt> {
        self.dispatch_inner(contact.id, message, template.id, DispatchMode::Automatic)
            .await
    }

    /// Send follow-up `schedule_id`.
    ///
    /// Under the contact lock the contact must still be `follow_up_scheduled`
    /// and `schedule_id` must still be its unfired schedule, otherwise
    /// [`OutreachError::FollowUpNotPending`] is returned without sending.
    /// Once an attempt is made the schedule is marked fired, and a successful
    /// send returns the contact to `contacted`.
    pub async fn dispatch_follow_up(
        &self,
        contact: &Contact,
        message: &PersonalizedMessage,
        template: &Template,
        schedule_id: i64,
    ) -> OutreachResult<DispatchReceipt> {
        self.dispatch_inner(
            contact.id,
            message,
            template.id,
            DispatchMode::FollowUp { schedule_id },
        )
        .await
    }

    async fn dispatch_inner(
        &self,
        contact_id: i64,
        message: &PersonalizedMessage,
        template_id: i64,
        mode: DispatchMode,
    ) -> OutreachResult<DispatchReceipt> {
        let request_id = Uuid::new_v4();
        let _guard = self.locks.acquire(contact_id).await;

        // Status may have moved since the caller loaded the contact
        let mut contact = self
            .database
            .get_contact(contact_id)
            .await?
            .ok_or_else(|| OutreachError::contact_not_found(contact_id))?;

        if mode != DispatchMode::Manual && contact.status.is_terminal() {
            debug!(
                "[{request_id}] Skipping automatic send to contact {contact_id}: {}",
                contact.status
            );
            return Err(OutreachError::TerminalContact {
                contact_id,
                status: contact.status,
            });
        }

        if let DispatchMode::FollowUp { schedule_id } = mode {
            let active = self.database.get_active_follow_up(contact_id).await?;
            if contact.status != ContactStatus::FollowUpScheduled
                || active.map(|s| s.id) != Some(schedule_id)
            {
                debug!(
                    "[{request_id}] Follow-up {schedule_id} for contact {contact_id} was cancelled or replaced"
                );
                return Err(OutreachError::FollowUpNotPending {
                    schedule_id,
                    contact_id,
                });
            }
        }

        let result = self
            .attempt(request_id, &mut contact, message, template_id, mode)
            .await;

        if let DispatchMode::FollowUp { schedule_id } = mode {
            if let Err(e) = self
                .database
                .mark_follow_up_fired(schedule_id, Utc::now(), false)
                .await
            {
                error!("[{request_id}] Could not mark follow-up {schedule_id} fired: {e}");
            }
        }

        result
    }

    /// Validate, deliver, then store the new state and the dispatch record.
    /// Caller holds the contact lock.
    async fn attempt(
        &self,
        request_id: Uuid,
        contact: &mut Contact,
        message: &PersonalizedMessage,
        template_id: i64,
        mode: DispatchMode,
    ) -> OutreachResult<DispatchReceipt> {
        let contact_id = contact.id;

        if let Err(e) = validate_address(&contact.email) {
            warn!("[{request_id}] Contact {contact_id} rejected before delivery: {e}");
            self.record(contact, template_id, message, DispatchStatus::Failed, Some(e.to_string()))
                .await;
            return Err(e);
        }

        debug!(
            "[{request_id}] Delivering to {} (contact {contact_id}, ai_applied={})",
            contact.email, message.ai_applied
        );

        if let Err(e) = self
            .delivery
            .deliver(contact.email.trim(), &message.subject, &message.body)
            .await
        {
            let detail = e.to_string();
            warn!("[{request_id}] Delivery to contact {contact_id} failed: {detail}");
            self.record(contact, template_id, message, DispatchStatus::Failed, Some(detail.clone()))
                .await;
            return Err(OutreachError::Delivery { contact_id, detail });
        }

        let sent_at = Utc::now();
        contact.last_contacted_at = Some(sent_at);
        match mode {
            DispatchMode::FollowUp { .. } => {
                contact.status = contact.status.transition_to(ContactStatus::Contacted)?;
                contact.follow_up_at = None;
            }
            _ if contact.status == ContactStatus::New => {
                contact.status = contact.status.transition_to(ContactStatus::Contacted)?;
            }
            _ => {}
        }

        // The message is out; a failed state write is logged, not reported as a failed send
        let state_saved = match self.database.update_contact_state(contact).await {
            Ok(()) => true,
            Err(e) => {
                error!("[{request_id}] Sent to contact {contact_id} but could not store its state: {e}");
                false
            }
        };
        self.record(contact, template_id, message, DispatchStatus::Sent, None)
            .await;

        info!(
            "[{request_id}] Sent \"{}\" to contact {contact_id} ({})",
            message.subject, contact.status
        );

        Ok(DispatchReceipt {
            contact_id,
            subject: message.subject.clone(),
            sent_at,
            status: contact.status,
            state_saved,
        })
    }

    async fn record(
        &self,
        contact: &Contact,
        template_id: i64,
        message: &PersonalizedMessage,
        status: DispatchStatus,
        detail: Option<String>,
    ) {
        let record = DispatchRecord {
            contact_id: contact.id,
            contact_name: contact.name.clone(),
            template_id,
            status,
            subject: message.subject.clone(),
            detail,
            at: Utc::now(),
        };

        if let Err(e) = self.recorder.record_dispatch(&record).await {
            error!(
                "Failed to record {} dispatch for contact {}: {e}",
                status.as_str(),
                contact.id
            );
        }
    }
}
