//! Test doubles and fixtures shared by the unit tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::models::{Contact, ContactStatus, NewContact, NewTemplate, Template};
use crate::database::Database;
use crate::features::dispatch::{Delivery, DeliveryError};
use crate::features::personalization::{EnrichedText, Enricher, EnrichmentRequest};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub at: Instant,
}

/// Delivery that keeps every message in memory and fails for chosen addresses
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }

    pub fn sent_times(&self) -> Vec<Instant> {
        self.sent().into_iter().map(|m| m.at).collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(DeliveryError::Rejected {
                status: 550,
                body: "mailbox unavailable".to_string(),
            });
        }

        self.sent.lock().unwrap().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Delivery that accepts the message but deletes the contact row while sending,
/// so the dispatcher's state write afterwards fails
pub struct VanishingDelivery {
    database: Database,
    contact_id: i64,
    inner: RecordingDelivery,
}

impl VanishingDelivery {
    pub fn new(database: Database, contact_id: i64) -> Self {
        Self {
            database,
            contact_id,
            inner: RecordingDelivery::new(),
        }
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.inner.sent_to()
    }
}

#[async_trait]
impl Delivery for VanishingDelivery {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.database
            .delete_contact(self.contact_id)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        self.inner.deliver(to, subject, body).await
    }
}

enum Script {
    Succeed(EnrichedText),
    Fail(String),
    Hang,
}

/// Enricher with a fixed response
pub struct ScriptedEnricher {
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEnricher {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn succeed(subject: &str, body: &str) -> Self {
        Self::with(Script::Succeed(EnrichedText {
            subject: subject.to_string(),
            body: body.to_string(),
        }))
    }

    pub fn fail(message: &str) -> Self {
        Self::with(Script::Fail(message.to_string()))
    }

    /// Never answers within any reasonable test timeout
    pub fn hang() -> Self {
        Self::with(Script::Hang)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Enricher for ScriptedEnricher {
    async fn enrich(&self, _request: &EnrichmentRequest) -> Result<EnrichedText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Succeed(text) => Ok(text.clone()),
            Script::Fail(message) => Err(anyhow::anyhow!("{message}")),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow::anyhow!("woke up"))
            }
        }
    }
}

pub fn sample_contact(name: &str, email: &str, university: &str) -> Contact {
    Contact {
        id: 1,
        name: name.to_string(),
        email: email.to_string(),
        university: university.to_string(),
        department: None,
        research_interest: None,
        website: None,
        status: ContactStatus::New,
        last_contacted_at: None,
        follow_up_at: None,
        reply_received_at: None,
    }
}

pub fn sample_template(subject: &str, body: &str) -> Template {
    Template {
        id: 1,
        name: "Intro".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        use_ai_personalization: false,
        is_default: false,
    }
}

pub async fn seed_contact(database: &Database, name: &str, email: &str) -> Contact {
    let id = database
        .create_contact(&NewContact {
            name: name.to_string(),
            email: email.to_string(),
            university: "MIT".to_string(),
            research_interest: Some("soft robotics".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    database.get_contact(id).await.unwrap().unwrap()
}

pub async fn seed_template(database: &Database, subject: &str, body: &str) -> Template {
    let id = database
        .create_template(&NewTemplate {
            name: "Intro".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    database.get_template(id).await.unwrap().unwrap()
}

/// Force a status directly in storage, bypassing the transition table
pub async fn set_status(database: &Database, contact: &mut Contact, status: ContactStatus) {
    contact.status = status;
    database.update_contact_state(contact).await.unwrap();
}
