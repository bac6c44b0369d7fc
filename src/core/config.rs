//! Environment-driven configuration
//!
//! Values here are process defaults only. Batch pacing and limits are passed
//! explicitly to the batch runner so runs stay reproducible.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    /// AI enrichment is disabled when unset
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub enrichment_timeout: Duration,
    pub mail_relay_url: Option<String>,
    pub mail_relay_token: Option<String>,
    pub from_email: String,
    pub from_name: String,
    pub batch_delay: Duration,
    pub max_emails_per_batch: usize,
    pub followup_check_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let check_interval: u64 = parse_or(&lookup, "FOLLOWUP_CHECK_INTERVAL_SECONDS", 3600)?;
        anyhow::ensure!(
            check_interval > 0,
            "FOLLOWUP_CHECK_INTERVAL_SECONDS must be at least 1"
        );

        Ok(Config {
            database_path: non_empty("DATABASE_PATH").unwrap_or_else(|| "thesislink.db".to_string()),
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            enrichment_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ENRICHMENT_TIMEOUT_SECONDS",
                30u64,
            )?),
            mail_relay_url: non_empty("MAIL_RELAY_URL"),
            mail_relay_token: non_empty("MAIL_RELAY_TOKEN"),
            from_email: non_empty("SMTP_FROM_EMAIL").unwrap_or_default(),
            from_name: non_empty("SMTP_FROM_NAME").unwrap_or_else(|| "ThesisLink".to_string()),
            batch_delay: Duration::from_secs(parse_or(&lookup, "BATCH_EMAIL_DELAY_SECONDS", 5u64)?),
            max_emails_per_batch: parse_or(&lookup, "MAX_EMAILS_PER_BATCH", 50usize)?,
            followup_check_interval: Duration::from_secs(check_interval),
        })
    }

    pub fn ai_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        None => Ok(default),
    }
}
