//! # Features Module
//!
//! Outreach features: personalization, dispatch, batching, follow-ups and the
//! activity log.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

pub mod activity;
pub mod batch;
pub mod dispatch;
pub mod followups;
pub mod personalization;

// Re-export commonly used items
pub use activity::{ActivityRecorder, DispatchRecord, DispatchStatus};
pub use batch::{BatchCancellation, BatchRequest, BatchResult, BatchRunner, FailedContact};
pub use dispatch::{
    ContactLocks, Delivery, DeliveryError, DispatchReceipt, Dispatcher, HttpRelayDelivery, Sender,
};
pub use followups::{FollowUpScheduler, PromotionOutcome, SkipReason};
pub use personalization::{
    Enriched, EnrichedText, Enricher, EnrichmentRequest, OpenAiEnricher, PersonalizedMessage,
    Personalizer,
};
