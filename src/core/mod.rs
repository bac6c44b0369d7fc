//! # Core Module
//!
//! Core domain types, configuration, and error handling for the outreach engine.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial creation with config, error, models and text modules

pub mod config;
pub mod error;
pub mod models;
pub mod text;

// Re-export commonly used items
pub use config::Config;
pub use error::{OutreachError, OutreachResult};
pub use models::{
    ActivityEntry, ActivityType, Contact, ContactStatus, FollowUpSchedule, NewContact,
    NewTemplate, Template,
};
pub use text::{normalize_subject, truncate_for_activity, truncate_with_ellipsis};
