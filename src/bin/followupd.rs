use anyhow::{Context, Result};
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

use thesislink::core::Config;
use thesislink::database::Database;
use thesislink::features::dispatch::{HttpRelayDelivery, Sender};
use thesislink::OutreachContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    // The openai crate reads its key from the environment
    if let Some(key) = &config.openai_api_key {
        std::env::set_var("OPENAI_API_KEY", key);
        std::env::set_var("OPENAI_KEY", key);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting ThesisLink follow-up daemon...");

    let relay_url = config
        .mail_relay_url
        .clone()
        .context("MAIL_RELAY_URL must be set to deliver follow-ups")?;

    if config.from_email.is_empty() {
        warn!("SMTP_FROM_EMAIL is not set; the relay must supply a sender address");
    }
    if !config.ai_enabled() {
        info!("OPENAI_API_KEY not set, AI personalization disabled");
    }

    let database = Database::new(&config.database_path).await?;
    let delivery = HttpRelayDelivery::new(
        relay_url,
        config.mail_relay_token.clone(),
        Sender {
            email: config.from_email.clone(),
            name: config.from_name.clone(),
        },
    )?;
    let context = OutreachContext::from_config(&config, database, Arc::new(delivery));

    let scheduler = context.scheduler.clone();
    let interval = config.followup_check_interval;
    let worker = tokio::spawn(async move {
        scheduler.run(interval).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, stopping follow-up scheduler");
    worker.abort();
    if let Err(e) = worker.await {
        if !e.is_cancelled() {
            error!("Follow-up scheduler task ended abnormally: {e}");
        }
    }

    Ok(())
}
