//! # Follow-Ups Feature
//!
//! Timed follow-up emails for contacts who have not replied.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod scheduler;

pub use scheduler::{
    FollowUpScheduler, PromotionOutcome, SkipReason, DEFAULT_CHECK_INTERVAL, MIN_CHECK_INTERVAL,
    FOLLOW_UP_SUBJECT_PREFIX,
};
