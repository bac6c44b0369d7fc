//! # Activity Feature
//!
//! Append-only log of dispatch outcomes and follow-up bookkeeping.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod recorder;

pub use recorder::{ActivityRecorder, DispatchRecord, DispatchStatus};
