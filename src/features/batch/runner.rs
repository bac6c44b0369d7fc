//! # Feature: Batch Runner
//!
//! Sends one template to a list of contacts, one at a time with a fixed pause
//! between delivery attempts. Individual failures are collected, never fatal.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Sequential paced sends, cooperative cancellation, terminal-status skips
//! - 1.1.0: Contacts re-read after each pause; sent-but-unsaved counts as sent

use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::core::error::{OutreachError, OutreachResult};
use crate::core::models::Contact;
use crate::database::Database;
use crate::features::dispatch::Dispatcher;
use crate::features::personalization::Personalizer;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub contact_ids: Vec<i64>,
    pub template_id: i64,
    pub use_ai: bool,
    pub extra_context: Option<String>,
    /// Pause before every delivery attempt except the first
    pub delay: Duration,
}

impl BatchRequest {
    pub fn new(contact_ids: Vec<i64>, template_id: i64) -> Self {
        Self {
            contact_ids,
            template_id,
            use_ai: false,
            extra_context: None,
            delay: DEFAULT_BATCH_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_ai(mut self, extra_context: Option<String>) -> Self {
        self.use_ai = true;
        self.extra_context = extra_context;
        self
    }
}

/// Shared flag checked between contacts
#[derive(Debug, Clone, Default)]
pub struct BatchCancellation {
    cancelled: Arc<AtomicBool>,
}

impl BatchCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedContact {
    pub contact_id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_contacts: Vec<FailedContact>,
    pub skipped_terminal: Vec<i64>,
    pub not_attempted: Vec<i64>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Sent {} emails successfully, {} failed",
            self.success_count, self.failed_count
        );
        if !self.skipped_terminal.is_empty() {
            summary.push_str(&format!(", {} skipped", self.skipped_terminal.len()));
        }
        if self.cancelled {
            summary.push_str(&format!(
                " (cancelled, {} not attempted)",
                self.not_attempted.len()
            ));
        }
        summary
    }

    fn fail(&mut self, failed: FailedContact) {
        self.failed_count += 1;
        self.failed_contacts.push(failed);
    }
}

#[derive(Clone)]
pub struct BatchRunner {
    database: Database,
    personalizer: Personalizer,
    dispatcher: Dispatcher,
    max_batch_size: usize,
}

impl BatchRunner {
    pub fn new(database: Database, personalizer: Personalizer, dispatcher: Dispatcher) -> Self {
        Self {
            database,
            personalizer,
            dispatcher,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub async fn run_batch(
        &self,
        request: &BatchRequest,
        cancel: &BatchCancellation,
    ) -> OutreachResult<BatchResult> {
        let contact_ids = self.validate(request)?;
        let template = self
            .database
            .get_template(request.template_id)
            .await?
            .ok_or_else(|| OutreachError::template_not_found(request.template_id))?;

        let request_id = Uuid::new_v4();
        info!(
            "[{request_id}] Starting batch of {} contacts with template {} (delay {:?})",
            contact_ids.len(),
            template.id,
            request.delay
        );

        let mut result = BatchResult {
            total: contact_ids.len(),
            ..Default::default()
        };
        let mut attempted_any = false;

        for (index, &contact_id) in contact_ids.iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                result.not_attempted = contact_ids[index..].to_vec();
                break;
            }

            let mut contact = match self.load_contact(contact_id, request_id).await {
                Ok(contact) => contact,
                Err(failed) => {
                    result.fail(failed);
                    continue;
                }
            };

            if !contact.status.is_terminal() && attempted_any && !request.delay.is_zero() {
                sleep(request.delay).await;
                if cancel.is_cancelled() {
                    result.cancelled = true;
                    result.not_attempted = contact_ids[index..].to_vec();
                    break;
                }

                // Edits made during the pause must reach the message
                contact = match self.load_contact(contact_id, request_id).await {
                    Ok(contact) => contact,
                    Err(failed) => {
                        result.fail(failed);
                        continue;
                    }
                };
            }

            if contact.status.is_terminal() {
                info!(
                    "[{request_id}] Skipping contact {contact_id}: status is {}",
                    contact.status
                );
                result.skipped_terminal.push(contact_id);
                continue;
            }

            let message = self
                .personalizer
                .personalize(
                    &template,
                    &contact,
                    request.use_ai,
                    request.extra_context.as_deref(),
                )
                .await;

            match self
                .dispatcher
                .dispatch_automatic(&contact, &message, &template)
                .await
            {
                Ok(receipt) => {
                    attempted_any = true;
                    result.success_count += 1;
                    if !receipt.state_saved {
                        warn!(
                            "[{request_id}] Contact {contact_id} was sent to but its status was not stored"
                        );
                    }
                }
                Err(OutreachError::TerminalContact { status, .. }) => {
                    info!("[{request_id}] Contact {contact_id} became {status} before sending");
                    result.skipped_terminal.push(contact_id);
                }
                Err(e) => {
                    attempted_any = true;
                    result.fail(FailedContact {
                        contact_id,
                        name: Some(contact.name.clone()),
                        email: Some(contact.email.clone()),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!("[{request_id}] Batch finished: {}", result.summary());
        Ok(result)
    }

    async fn load_contact(&self, contact_id: i64, request_id: Uuid) -> Result<Contact, FailedContact> {
        match self.database.get_contact(contact_id).await {
            Ok(Some(contact)) => Ok(contact),
            Ok(None) => Err(FailedContact {
                contact_id,
                name: None,
                email: None,
                error: OutreachError::contact_not_found(contact_id).to_string(),
            }),
            Err(e) => {
                warn!("[{request_id}] Could not load contact {contact_id}: {e}");
                Err(FailedContact {
                    contact_id,
                    name: None,
                    email: None,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Up-front checks; returns the contact ids with duplicates removed
    fn validate(&self, request: &BatchRequest) -> OutreachResult<Vec<i64>> {
        if request.contact_ids.is_empty() {
            return Err(OutreachError::Validation(
                "batch contains no contacts".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let contact_ids: Vec<i64> = request
            .contact_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if contact_ids.len() > self.max_batch_size {
            return Err(OutreachError::Validation(format!(
                "batch of {} contacts exceeds the limit of {}",
                contact_ids.len(),
                self.max_batch_size
            )));
        }
        Ok(contact_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ContactStatus, NewContact};
    use crate::features::dispatch::ContactLocks;
    use crate::testing::{seed_contact, seed_template, RecordingDelivery, VanishingDelivery};
    use std::time::Instant;

    struct Harness {
        database: Database,
        delivery: Arc<RecordingDelivery>,
        runner: BatchRunner,
        template_id: i64,
    }

    async fn harness() -> Harness {
        let database = Database::new(":memory:").await.unwrap();
        let delivery = Arc::new(RecordingDelivery::new());
        let dispatcher = Dispatcher::new(database.clone(), delivery.clone(), ContactLocks::new());
        let runner = BatchRunner::new(database.clone(), Personalizer::basic_only(), dispatcher);
        let template = seed_template(&database, "Dear [ProfName]", "Hello from [University]").await;
        Harness {
            database,
            delivery,
            runner,
            template_id: template.id,
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_collected() {
        let h = harness().await;
        let a = seed_contact(&h.database, "Ada", "ada@cam.ac.uk").await;
        let b = seed_contact(&h.database, "Bob", "bob-at-nowhere").await;
        let c = seed_contact(&h.database, "Cy", "cy@mit.edu").await;

        let request = BatchRequest::new(vec![a.id, b.id, c.id], h.template_id)
            .with_delay(Duration::ZERO);
        let result = h
            .runner
            .run_batch(&request, &BatchCancellation::new())
            .await
            .unwrap();

        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failed_contacts.len(), 1);
        assert_eq!(result.failed_contacts[0].contact_id, b.id);
        assert_eq!(
            h.delivery.sent_to(),
            vec!["ada@cam.ac.uk".to_string(), "cy@mit.edu".to_string()]
        );
        assert_eq!(h.database.count_dispatch_records(None).await.unwrap(), 3);
        assert_eq!(result.summary(), "Sent 2 emails successfully, 1 failed");
    }

    #[tokio::test]
    async fn test_pacing_between_attempts() {
        let h = harness().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(seed_contact(&h.database, "Prof", &format!("p{i}@uni.edu")).await.id);
        }

        let delay = Duration::from_millis(40);
        let request = BatchRequest::new(ids, h.template_id).with_delay(delay);
        let started = Instant::now();
        let result = h
            .runner
            .run_batch(&request, &BatchCancellation::new())
            .await
            .unwrap();

        assert_eq!(result.success_count, 3);
        assert!(started.elapsed() >= delay * 2);

        let times = h.delivery.sent_times();
        assert!(times[1].duration_since(times[0]) >= delay);
        assert!(times[2].duration_since(times[1]) >= delay);
    }

    #[tokio::test]
    async fn test_replied_contact_is_skipped() {
        let h = harness().await;
        let a = seed_contact(&h.database, "Ada", "ada@cam.ac.uk").await;
        let mut b = seed_contact(&h.database, "Bob", "bob@mit.edu").await;
        b.status = ContactStatus::Replied;
        h.database.update_contact_state(&b).await.unwrap();

        let request = BatchRequest::new(vec![a.id, b.id], h.template_id)
            .with_delay(Duration::ZERO);
        let result = h
            .runner
            .run_batch(&request, &BatchCancellation::new())
            .await
            .unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.skipped_terminal, vec![b.id]);
        assert_eq!(h.database.count_dispatch_records(None).await.unwrap(), 1);

        let b = h.database.get_contact(b.id).await.unwrap().unwrap();
        assert_eq!(b.status, ContactStatus::Replied);
    }

    #[tokio::test]
    async fn test_cancellation_between_contacts() {
        let h = harness().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(seed_contact(&h.database, "Prof", &format!("p{i}@uni.edu")).await.id);
        }

        let cancel = BatchCancellation::new();
        let trigger = cancel.clone();
        let request = BatchRequest::new(ids.clone(), h.template_id)
            .with_delay(Duration::from_millis(100));

        let runner = h.runner.clone();
        let handle = tokio::spawn(async move { runner.run_batch(&request, &cancel).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();

        let result = handle.await.unwrap().unwrap();
        assert!(result.cancelled);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.not_attempted, ids[1..].to_vec());
        assert_eq!(h.delivery.sent_to().len(), 1);
    }

    #[tokio::test]
    async fn test_up_front_validation() {
        let h = harness().await;
        let cancel = BatchCancellation::new();

        let err = h
            .runner
            .run_batch(&BatchRequest::new(vec![], h.template_id), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));

        let err = h
            .runner
            .clone()
            .with_max_batch_size(2)
            .run_batch(&BatchRequest::new(vec![1, 2, 3], h.template_id), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));

        let err = h
            .runner
            .run_batch(&BatchRequest::new(vec![1], 999), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::NotFound { entity: "Template", .. }));
        assert!(h.delivery.sent_to().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_and_missing_contacts() {
        let h = harness().await;
        let a = seed_contact(&h.database, "Ada", "ada@cam.ac.uk").await;

        let request = BatchRequest::new(vec![a.id, a.id, 777], h.template_id)
            .with_delay(Duration::ZERO);
        let result = h
            .runner
            .run_batch(&request, &BatchCancellation::new())
            .await
            .unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_contacts[0].contact_id, 777);
        assert_eq!(h.delivery.sent_to().len(), 1);
    }

    #[tokio::test]
    async fn test_contact_edits_during_pause_are_used() {
        let h = harness().await;
        let a = seed_contact(&h.database, "Ada", "ada@cam.ac.uk").await;
        let b = seed_contact(&h.database, "Bob", "bob@mit.edu").await;

        let request = BatchRequest::new(vec![a.id, b.id], h.template_id)
            .with_delay(Duration::from_millis(150));
        let runner = h.runner.clone();
        let handle = tokio::spawn(async move {
            runner.run_batch(&request, &BatchCancellation::new()).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let profile = NewContact {
            name: "Bob".to_string(),
            email: "bob@stanford.edu".to_string(),
            university: "Stanford".to_string(),
            ..Default::default()
        };
        assert!(h.database.update_contact_profile(b.id, &profile).await.unwrap());

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.success_count, 2);

        let sent = h.delivery.sent();
        assert_eq!(sent[1].to, "bob@stanford.edu");
        assert_eq!(sent[1].body, "Hello from Stanford");
    }

    #[tokio::test]
    async fn test_sent_with_unsaved_status_counts_as_success() {
        let database = Database::new(":memory:").await.unwrap();
        let template = seed_template(&database, "Hi", "Body").await;
        let a = seed_contact(&database, "Ada", "ada@cam.ac.uk").await;
        let delivery = Arc::new(VanishingDelivery::new(database.clone(), a.id));
        let dispatcher = Dispatcher::new(database.clone(), delivery.clone(), ContactLocks::new());
        let runner = BatchRunner::new(database.clone(), Personalizer::basic_only(), dispatcher);

        let request = BatchRequest::new(vec![a.id], template.id).with_delay(Duration::ZERO);
        let result = runner
            .run_batch(&request, &BatchCancellation::new())
            .await
            .unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_count, 0);
        assert_eq!(delivery.sent_to(), vec!["ada@cam.ac.uk".to_string()]);
    }
}
