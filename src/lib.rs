// Core layer - shared types, configuration and errors
pub mod core;

// Features layer - all feature modules
pub mod features;

// Infrastructure
pub mod database;

// Application layer
pub mod outreach;

#[cfg(test)]
mod testing;

pub use crate::core::{Config, OutreachError, OutreachResult};
pub use database::Database;
pub use outreach::OutreachContext;
