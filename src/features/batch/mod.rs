//! # Batch Feature
//!
//! Paced multi-contact sends with partial-failure reporting.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod runner;

pub use runner::{
    BatchCancellation, BatchRequest, BatchResult, BatchRunner, FailedContact,
    DEFAULT_BATCH_DELAY, DEFAULT_MAX_BATCH_SIZE,
};
