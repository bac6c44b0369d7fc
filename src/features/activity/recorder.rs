//! # Feature: Activity Recorder
//!
//! Writes dispatch records and follow-up events to the activity log. Entries are
//! never updated or deleted once written.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::models::{ActivityType, Contact};
use crate::core::text::truncate_for_activity;
use crate::database::{Database, NewActivity};

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::Failed => "failed",
        }
    }

    fn activity_type(&self) -> ActivityType {
        match self {
            DispatchStatus::Sent => ActivityType::EmailSent,
            DispatchStatus::Failed => ActivityType::EmailFailed,
        }
    }
}

/// What gets logged for every attempted dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub contact_id: i64,
    pub contact_name: String,
    pub template_id: i64,
    pub status: DispatchStatus,
    pub subject: String,
    /// Error detail for failed attempts
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ActivityRecorder {
    database: Database,
}

impl ActivityRecorder {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn record_dispatch(&self, record: &DispatchRecord) -> Result<()> {
        let title = match record.status {
            DispatchStatus::Sent => format!("Email sent to {}", record.contact_name),
            DispatchStatus::Failed => format!("Failed to send email to {}", record.contact_name),
        };

        let description = match &record.detail {
            Some(detail) => format!("Subject: {}\nError: {}", record.subject, detail),
            None => format!("Subject: {}", record.subject),
        };

        self.database
            .append_activity(&NewActivity {
                contact_id: record.contact_id,
                template_id: Some(record.template_id),
                activity_type: record.status.activity_type(),
                title,
                description: Some(truncate_for_activity(&description)),
                created_at: record.at,
            })
            .await?;

        debug!(
            "Recorded {} dispatch for contact {}",
            record.status.as_str(),
            record.contact_id
        );
        Ok(())
    }

    pub async fn record_follow_up_scheduled(
        &self,
        contact: &Contact,
        template_id: i64,
        due_at: DateTime<Utc>,
    ) -> Result<()> {
        self.append(
            contact,
            Some(template_id),
            ActivityType::FollowUpScheduled,
            format!("Follow-up scheduled for {}", contact.name),
            Some(format!("Scheduled for {}", due_at.to_rfc3339())),
        )
        .await
    }

    pub async fn record_follow_up_cancelled(&self, contact: &Contact, template_id: i64) -> Result<()> {
        self.append(
            contact,
            Some(template_id),
            ActivityType::FollowUpCancelled,
            format!("Follow-up cancelled for {}", contact.name),
            None,
        )
        .await
    }

    pub async fn record_reply(&self, contact: &Contact) -> Result<()> {
        self.append(
            contact,
            None,
            ActivityType::ReplyReceived,
            format!("Reply received from {}", contact.name),
            None,
        )
        .await
    }

    async fn append(
        &self,
        contact: &Contact,
        template_id: Option<i64>,
        activity_type: ActivityType,
        title: String,
        description: Option<String>,
    ) -> Result<()> {
        self.database
            .append_activity(&NewActivity {
                contact_id: contact.id,
                template_id,
                activity_type,
                title,
                description,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}
