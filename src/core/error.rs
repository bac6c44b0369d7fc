//! Error types for outreach operations
//!
//! Errors are classified by how a caller should react:
//! - Rejected up front: validation failures, unknown records, disallowed status changes
//! - Surfaced after an attempt: delivery failures (eligible for a later manual resend)
//! - Skips: automatic sends refused because the contact already replied or was closed,
//!   or because the follow-up being sent was cancelled or replaced
//!
//! Enrichment failures never appear here; the personalizer absorbs them.

use thiserror::Error;

use crate::core::models::ContactStatus;

pub type OutreachResult<T> = std::result::Result<T, OutreachError>;

#[derive(Debug, Error)]
pub enum OutreachError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Delivery to contact {contact_id} failed: {detail}")]
    Delivery { contact_id: i64, detail: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ContactStatus,
        to: ContactStatus,
    },

    #[error("Contact {contact_id} is {status}, automatic dispatch skipped")]
    TerminalContact {
        contact_id: i64,
        status: ContactStatus,
    },

    #[error("Follow-up {schedule_id} for contact {contact_id} is no longer pending")]
    FollowUpNotPending { schedule_id: i64, contact_id: i64 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OutreachError {
    pub fn contact_not_found(id: i64) -> Self {
        OutreachError::NotFound {
            entity: "Contact",
            id,
        }
    }

    pub fn template_not_found(id: i64) -> Self {
        OutreachError::NotFound {
            entity: "Template",
            id,
        }
    }

    /// Returns true if a caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OutreachError::Delivery { .. } | OutreachError::Storage(_)
        )
    }

    /// Returns true if the operation was refused before any side effect
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            OutreachError::Validation(_)
                | OutreachError::NotFound { .. }
                | OutreachError::InvalidTransition { .. }
        )
    }
}

impl From<sqlite::Error> for OutreachError {
    fn from(err: sqlite::Error) -> Self {
        OutreachError::Storage(err.into())
    }
}
