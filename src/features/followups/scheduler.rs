//! # Feature: Follow-Up Scheduler
//!
//! Creates, cancels and promotes per-contact follow-up reminders. Promotion
//! sends a prefixed copy of the schedule's template; the schedule is marked
//! fired once the attempt completes, whatever the outcome. A cancel, reply or
//! reschedule that lands while the message is being prepared wins.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Schedule/cancel/promote with injected clock and periodic runner
//! - 1.1.0: Pending check moved under the contact lock; minimum check interval

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::core::error::{OutreachError, OutreachResult};
use crate::core::models::{ContactStatus, FollowUpSchedule, Template};
use crate::database::Database;
use crate::features::activity::ActivityRecorder;
use crate::features::dispatch::Dispatcher;
use crate::features::personalization::Personalizer;

pub const FOLLOW_UP_SUBJECT_PREFIX: &str = "Follow-up: ";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Why a due schedule was retired without sending
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ContactMissing,
    TemplateMissing,
    /// The contact left `follow_up_scheduled` (replied, closed, ...)
    NotScheduled(ContactStatus),
    /// Another schedule for the same contact was handled in this pass
    Superseded,
    /// Cancelled or replaced while the message was being prepared
    NoLongerPending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PromotionOutcome {
    Sent {
        schedule_id: i64,
        contact_id: i64,
    },
    Skipped {
        schedule_id: i64,
        contact_id: i64,
        reason: SkipReason,
    },
    Failed {
        schedule_id: i64,
        contact_id: i64,
        error: String,
    },
}

#[derive(Clone)]
pub struct FollowUpScheduler {
    database: Database,
    personalizer: Personalizer,
    dispatcher: Dispatcher,
    recorder: ActivityRecorder,
}

impl FollowUpScheduler {
    pub fn new(database: Database, personalizer: Personalizer, dispatcher: Dispatcher) -> Self {
        Self {
            recorder: ActivityRecorder::new(database.clone()),
            database,
            personalizer,
            dispatcher,
        }
    }

    pub async fn schedule(
        &self,
        contact_id: i64,
        template_id: Option<i64>,
        due_at: DateTime<Utc>,
    ) -> OutreachResult<FollowUpSchedule> {
        self.schedule_at(contact_id, template_id, due_at, Utc::now())
            .await
    }

    /// Schedule a follow-up as of `now`. Replaces any pending schedule for the contact.
    pub async fn schedule_at(
        &self,
        contact_id: i64,
        template_id: Option<i64>,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> OutreachResult<FollowUpSchedule> {
        if due_at < now {
            return Err(OutreachError::Validation(format!(
                "follow-up date {} is in the past",
                due_at.to_rfc3339()
            )));
        }

        let template = self.resolve_template(template_id).await?;

        let _guard = self.dispatcher.locks().acquire(contact_id).await;
        let mut contact = self
            .database
            .get_contact(contact_id)
            .await?
            .ok_or_else(|| OutreachError::contact_not_found(contact_id))?;

        if contact.status.is_terminal() || contact.status == ContactStatus::New {
            return Err(OutreachError::Validation(format!(
                "cannot schedule a follow-up for a contact that is {}",
                contact.status
            )));
        }

        let schedule = self
            .database
            .upsert_follow_up(contact_id, template.id, due_at, now)
            .await?;

        contact.follow_up_at = Some(schedule.due_at);
        if contact.status == ContactStatus::Contacted {
            contact.status = contact
                .status
                .transition_to(ContactStatus::FollowUpScheduled)?;
        }
        self.database.update_contact_state(&contact).await?;
        self.recorder
            .record_follow_up_scheduled(&contact, template.id, schedule.due_at)
            .await?;

        info!(
            "Follow-up {} scheduled for contact {contact_id} at {}",
            schedule.id,
            schedule.due_at.to_rfc3339()
        );
        Ok(schedule)
    }

    /// Cancel the contact's pending follow-up. Returns false if there was none.
    pub async fn cancel(&self, contact_id: i64) -> OutreachResult<bool> {
        let _guard = self.dispatcher.locks().acquire(contact_id).await;

        let Some(schedule) = self.database.get_active_follow_up(contact_id).await? else {
            debug!("No pending follow-up to cancel for contact {contact_id}");
            return Ok(false);
        };

        self.database
            .mark_follow_up_fired(schedule.id, Utc::now(), true)
            .await?;

        if let Some(mut contact) = self.database.get_contact(contact_id).await? {
            contact.follow_up_at = None;
            if contact.status == ContactStatus::FollowUpScheduled {
                contact.status = contact.status.transition_to(ContactStatus::Contacted)?;
            }
            self.database.update_contact_state(&contact).await?;
            self.recorder
                .record_follow_up_cancelled(&contact, schedule.template_id)
                .await?;
        }

        info!("Cancelled follow-up {} for contact {contact_id}", schedule.id);
        Ok(true)
    }

    /// Send every follow-up due at `now`. Each schedule is handled independently.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> OutreachResult<Vec<PromotionOutcome>> {
        let request_id = Uuid::new_v4();
        let due = self.database.get_due_follow_ups(now).await?;
        if due.is_empty() {
            debug!("[{request_id}] No follow-ups due");
            return Ok(Vec::new());
        }

        info!("[{request_id}] Promoting {} due follow-up(s)", due.len());

        let mut handled = HashSet::new();
        let mut outcomes = Vec::with_capacity(due.len());
        for schedule in &due {
            let outcome = if handled.insert(schedule.contact_id) {
                self.promote_one(schedule, request_id).await
            } else {
                self.retire(schedule, SkipReason::Superseded, request_id)
                    .await
            };
            outcomes.push(outcome);
        }

        let sent = outcomes
            .iter()
            .filter(|o| matches!(o, PromotionOutcome::Sent { .. }))
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, PromotionOutcome::Failed { .. }))
            .count();
        info!(
            "[{request_id}] Follow-up pass done: {sent} sent, {failed} failed, {} skipped",
            outcomes.len() - sent - failed
        );

        Ok(outcomes)
    }

    /// Promote on a fixed interval until the task is dropped.
    /// Intervals below [`MIN_CHECK_INTERVAL`] are raised to it.
    pub async fn run(&self, interval: Duration) {
        if interval < MIN_CHECK_INTERVAL {
            warn!(
                "Follow-up check interval {interval:?} is too short, using {MIN_CHECK_INTERVAL:?}"
            );
        }
        let interval = interval.max(MIN_CHECK_INTERVAL);
        info!(
            "Follow-up scheduler started, checking every {}s",
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.promote_due(Utc::now()).await {
                error!("Follow-up pass failed: {e}");
            }
        }
    }

    async fn resolve_template(&self, template_id: Option<i64>) -> OutreachResult<Template> {
        match template_id {
            Some(id) => self
                .database
                .get_template(id)
                .await?
                .ok_or_else(|| OutreachError::template_not_found(id)),
            None => self.database.get_default_template().await?.ok_or_else(|| {
                OutreachError::Validation(
                    "no template given and no default template is set".to_string(),
                )
            }),
        }
    }

    async fn promote_one(&self, schedule: &FollowUpSchedule, request_id: Uuid) -> PromotionOutcome {
        let failed = |error: String| PromotionOutcome::Failed {
            schedule_id: schedule.id,
            contact_id: schedule.contact_id,
            error,
        };

        let contact = match self.database.get_contact(schedule.contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                return self
                    .retire(schedule, SkipReason::ContactMissing, request_id)
                    .await
            }
            Err(e) => {
                error!("[{request_id}] Could not load contact {}: {e}", schedule.contact_id);
                return failed(e.to_string());
            }
        };

        if contact.status != ContactStatus::FollowUpScheduled {
            return self
                .retire(schedule, SkipReason::NotScheduled(contact.status), request_id)
                .await;
        }

        let template = match self.database.get_template(schedule.template_id).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                return self
                    .retire(schedule, SkipReason::TemplateMissing, request_id)
                    .await
            }
            Err(e) => {
                error!("[{request_id}] Could not load template {}: {e}", schedule.template_id);
                return failed(e.to_string());
            }
        };

        let message = self
            .personalizer
            .personalize(&template, &contact, false, None)
            .await
            .with_subject_prefix(FOLLOW_UP_SUBJECT_PREFIX);

        // Re-checked and marked fired by the dispatcher under the contact lock
        match self
            .dispatcher
            .dispatch_follow_up(&contact, &message, &template, schedule.id)
            .await
        {
            Ok(_) => PromotionOutcome::Sent {
                schedule_id: schedule.id,
                contact_id: schedule.contact_id,
            },
            Err(OutreachError::TerminalContact { status, .. }) => {
                self.retire(schedule, SkipReason::NotScheduled(status), request_id)
                    .await
            }
            Err(OutreachError::FollowUpNotPending { .. }) => {
                self.retire(schedule, SkipReason::NoLongerPending, request_id)
                    .await
            }
            Err(e) => {
                warn!("[{request_id}] Follow-up {} failed: {e}", schedule.id);
                failed(e.to_string())
            }
        }
    }

    /// Mark a schedule fired without sending
    async fn retire(
        &self,
        schedule: &FollowUpSchedule,
        reason: SkipReason,
        request_id: Uuid,
    ) -> PromotionOutcome {
        info!(
            "[{request_id}] Retiring follow-up {} for contact {}: {:?}",
            schedule.id, schedule.contact_id, reason
        );
        if let Err(e) = self
            .database
            .mark_follow_up_fired(schedule.id, Utc::now(), true)
            .await
        {
            error!("[{request_id}] Could not mark follow-up {} fired: {e}", schedule.id);
        }

        PromotionOutcome::Skipped {
            schedule_id: schedule.id,
            contact_id: schedule.contact_id,
            reason,
        }
    }
}
