//! Domain records shared by the outreach engine
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{OutreachError, OutreachResult};

/// Lifecycle of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    /// Never written to
    New,
    /// At least one message delivered
    Contacted,
    /// The contact answered (manual signal)
    Replied,
    /// A follow-up is pending
    FollowUpScheduled,
    /// No further outreach wanted (manual signal)
    Closed,
}

impl ContactStatus {
    /// Replied and closed contacts are never written to automatically
    pub fn is_terminal(self) -> bool {
        matches!(self, ContactStatus::Replied | ContactStatus::Closed)
    }

    /// The transition table. Anything not listed here is rejected.
    pub fn can_transition_to(self, next: ContactStatus) -> bool {
        use ContactStatus::*;

        match (self, next) {
            (New, Contacted) => true,
            (Contacted, FollowUpScheduled) => true,
            (FollowUpScheduled, Contacted) => true,
            // Manual overrides
            (from, Replied) => from != Replied,
            (from, Closed) => from != Closed,
            _ => false,
        }
    }

    pub fn transition_to(self, next: ContactStatus) -> OutreachResult<ContactStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OutreachError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Contacted => "contacted",
            ContactStatus::Replied => "replied",
            ContactStatus::FollowUpScheduled => "follow_up_scheduled",
            ContactStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContactStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(ContactStatus::New),
            "contacted" => Ok(ContactStatus::Contacted),
            "replied" => Ok(ContactStatus::Replied),
            "follow_up_scheduled" => Ok(ContactStatus::FollowUpScheduled),
            "closed" => Ok(ContactStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid contact status: {}", s)),
        }
    }
}

/// A person the user is writing to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub university: String,
    pub department: Option<String>,
    pub research_interest: Option<String>,
    pub website: Option<String>,
    pub status: ContactStatus,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub follow_up_at: Option<DateTime<Utc>>,
    pub reply_received_at: Option<DateTime<Utc>>,
}

/// Fields supplied when creating a contact
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub university: String,
    pub department: Option<String>,
    pub research_interest: Option<String>,
    pub website: Option<String>,
}

/// A message pattern with `[Placeholder]` tokens in subject and body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub use_ai_personalization: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
    pub use_ai_personalization: bool,
    pub is_default: bool,
}

/// Kinds of activity log entries written by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    EmailSent,
    EmailFailed,
    FollowUpScheduled,
    FollowUpCancelled,
    ReplyReceived,
}

impl ActivityType {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::EmailSent => "email_sent",
            ActivityType::EmailFailed => "email_failed",
            ActivityType::FollowUpScheduled => "follow_up_scheduled",
            ActivityType::FollowUpCancelled => "follow_up_cancelled",
            ActivityType::ReplyReceived => "reply_received",
        }
    }

    /// Sent and failed entries are dispatch records; the rest are bookkeeping
    pub fn is_dispatch_record(&self) -> bool {
        matches!(self, ActivityType::EmailSent | ActivityType::EmailFailed)
    }
}

impl std::str::FromStr for ActivityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "email_sent" => Ok(ActivityType::EmailSent),
            "email_failed" => Ok(ActivityType::EmailFailed),
            "follow_up_scheduled" => Ok(ActivityType::FollowUpScheduled),
            "follow_up_cancelled" => Ok(ActivityType::FollowUpCancelled),
            "reply_received" => Ok(ActivityType::ReplyReceived),
            _ => Err(anyhow::anyhow!("Invalid activity type: {}", s)),
        }
    }
}

/// One row of the append-only activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub contact_id: i64,
    pub template_id: Option<i64>,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A pending or spent follow-up reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpSchedule {
    pub id: i64,
    pub contact_id: i64,
    pub template_id: i64,
    pub due_at: DateTime<Utc>,
    pub fired: bool,
    pub fired_at: Option<DateTime<Utc>>,
    /// Fired without sending (cancelled or superseded)
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl FollowUpSchedule {
    pub fn is_active(&self) -> bool {
        !self.fired
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.fired && self.due_at <= now
    }
}
