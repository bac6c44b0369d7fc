//! Shared entry point for outreach operations
//!
//! Wires storage, personalization, delivery, batching and follow-ups together
//! and carries the manual actions (single send, preview, reply/close signals,
//! deletion) that sit on top of them.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Initial implementation

use chrono::Utc;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::error::{OutreachError, OutreachResult};
use crate::core::models::{Contact, ContactStatus, Template};
use crate::database::Database;
use crate::features::activity::ActivityRecorder;
use crate::features::batch::{BatchCancellation, BatchRequest, BatchResult, BatchRunner};
use crate::features::dispatch::{ContactLocks, Delivery, DispatchReceipt, Dispatcher};
use crate::features::followups::FollowUpScheduler;
use crate::features::personalization::{
    Enricher, OpenAiEnricher, PersonalizedMessage, Personalizer, DEFAULT_ENRICHMENT_TIMEOUT,
};

#[derive(Clone)]
pub struct OutreachContext {
    pub database: Database,
    pub personalizer: Personalizer,
    pub dispatcher: Dispatcher,
    pub batch_runner: BatchRunner,
    pub scheduler: FollowUpScheduler,
    recorder: ActivityRecorder,
    batch_delay: Duration,
}

impl OutreachContext {
    pub fn new(
        database: Database,
        delivery: Arc<dyn Delivery>,
        enricher: Option<Arc<dyn Enricher>>,
        enrichment_timeout: Duration,
    ) -> Self {
        let personalizer = Personalizer::new(enricher, enrichment_timeout);
        let dispatcher = Dispatcher::new(database.clone(), delivery, ContactLocks::new());
        let batch_runner =
            BatchRunner::new(database.clone(), personalizer.clone(), dispatcher.clone());
        let scheduler =
            FollowUpScheduler::new(database.clone(), personalizer.clone(), dispatcher.clone());

        Self {
            recorder: ActivityRecorder::new(database.clone()),
            database,
            personalizer,
            dispatcher,
            batch_runner,
            scheduler,
            batch_delay: crate::features::batch::DEFAULT_BATCH_DELAY,
        }
    }

    /// Build from process configuration. AI enrichment is enabled only when an
    /// API key is configured.
    pub fn from_config(config: &Config, database: Database, delivery: Arc<dyn Delivery>) -> Self {
        let enricher: Option<Arc<dyn Enricher>> = if config.ai_enabled() {
            Some(Arc::new(OpenAiEnricher::new(config.openai_model.clone())))
        } else {
            None
        };

        let mut context = Self::new(database, delivery, enricher, config.enrichment_timeout);
        context.batch_runner = context
            .batch_runner
            .with_max_batch_size(config.max_emails_per_batch);
        context.batch_delay = config.batch_delay;
        context
    }

    /// Context with no AI backend and default limits
    pub fn basic(database: Database, delivery: Arc<dyn Delivery>) -> Self {
        Self::new(database, delivery, None, DEFAULT_ENRICHMENT_TIMEOUT)
    }

    /// A batch request using the configured default pacing
    pub fn batch_request(&self, contact_ids: Vec<i64>, template_id: i64) -> BatchRequest {
        BatchRequest::new(contact_ids, template_id).with_delay(self.batch_delay)
    }

    /// Personalize without sending. Both basic and final text are returned.
    pub async fn preview(
        &self,
        contact_id: i64,
        template_id: i64,
        use_ai: bool,
        extra_context: Option<&str>,
    ) -> OutreachResult<PersonalizedMessage> {
        let (contact, template) = self.load(contact_id, template_id).await?;
        Ok(self
            .personalizer
            .personalize(&template, &contact, use_ai, extra_context)
            .await)
    }

    /// Personalize and send one message. Manual sends ignore terminal status.
    pub async fn send(
        &self,
        contact_id: i64,
        template_id: i64,
        use_ai: bool,
        extra_context: Option<&str>,
    ) -> OutreachResult<DispatchReceipt> {
        let (contact, template) = self.load(contact_id, template_id).await?;
        let message = self
            .personalizer
            .personalize(&template, &contact, use_ai, extra_context)
            .await;
        self.dispatcher.dispatch(&contact, &message, &template).await
    }

    pub async fn send_batch(
        &self,
        request: &BatchRequest,
        cancel: &BatchCancellation,
    ) -> OutreachResult<BatchResult> {
        self.batch_runner.run_batch(request, cancel).await
    }

    /// Record that the contact answered. Any pending follow-up is cancelled.
    pub async fn mark_replied(&self, contact_id: i64) -> OutreachResult<Contact> {
        let contact = {
            let _guard = self.dispatcher.locks().acquire(contact_id).await;
            let mut contact = self.require_contact(contact_id).await?;
            if contact.status == ContactStatus::Replied {
                return Ok(contact);
            }

            contact.status = contact.status.transition_to(ContactStatus::Replied)?;
            contact.reply_received_at = Some(Utc::now());
            self.database.update_contact_state(&contact).await?;
            contact
        };

        self.scheduler.cancel(contact_id).await?;
        self.recorder.record_reply(&contact).await?;

        info!("Contact {contact_id} marked as replied");
        self.require_contact(contact_id).await
    }

    /// Stop all outreach to the contact. Any pending follow-up is cancelled.
    pub async fn close_contact(&self, contact_id: i64) -> OutreachResult<Contact> {
        {
            let _guard = self.dispatcher.locks().acquire(contact_id).await;
            let mut contact = self.require_contact(contact_id).await?;
            if contact.status == ContactStatus::Closed {
                return Ok(contact);
            }

            contact.status = contact.status.transition_to(ContactStatus::Closed)?;
            self.database.update_contact_state(&contact).await?;
        }

        self.scheduler.cancel(contact_id).await?;

        info!("Contact {contact_id} closed");
        self.require_contact(contact_id).await
    }

    /// Cancel any pending follow-up, then delete. Returns false if the contact did not exist.
    pub async fn delete_contact(&self, contact_id: i64) -> OutreachResult<bool> {
        self.scheduler.cancel(contact_id).await?;
        Ok(self.database.delete_contact(contact_id).await?)
    }

    async fn require_contact(&self, contact_id: i64) -> OutreachResult<Contact> {
        self.database
            .get_contact(contact_id)
            .await?
            .ok_or_else(|| OutreachError::contact_not_found(contact_id))
    }

    async fn load(&self, contact_id: i64, template_id: i64) -> OutreachResult<(Contact, Template)> {
        let contact = self.require_contact(contact_id).await?;
        let template = self
            .database
            .get_template(template_id)
            .await?
            .ok_or_else(|| OutreachError::template_not_found(template_id))?;
        Ok((contact, template))
    }
}
