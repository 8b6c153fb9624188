//! Outfit bot
//!
//! A Telegram bot that collects garment photos and a short brief, then
//! generates an outfit image through a rate-limited job queue.

mod config;
mod conversation;
mod db;
mod generation;
mod job;
mod queue;
mod rate_limiter;
mod runtime;
mod state_machine;
mod telegram;

use config::Config;
use conversation::ConversationTable;
use db::Database;
use generation::{LoggingGenerator, OpenAIImageService};
use queue::{Dispatcher, JobQueue};
use rate_limiter::RateLimiter;
use runtime::{
    startup_rate_limits, BotRuntime, DatabaseJobStore, GenerationExecutor, ProductionExecutor,
    ProductionRuntime, ServiceImageGenerator,
};
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Extra shutdown time for persisting and notifying after generation
const SHUTDOWN_SLACK: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outfit_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let store = DatabaseJobStore::new(db);

    let settings = startup_rate_limits(&store).await;
    tracing::info!(
        requests_per_minute = settings.requests_per_minute,
        max_concurrent_requests = settings.max_concurrent_requests,
        "Rate limits loaded"
    );

    let service = OpenAIImageService::new(
        &config.openai,
        config.prompts.clone(),
        settings.max_concurrent_requests,
    )?;
    let generator = ServiceImageGenerator::new(Arc::new(LoggingGenerator::new(Arc::new(service))));
    tracing::info!(
        image_model = %config.openai.image_model,
        text_model = %config.openai.text_model,
        "Generation service initialized"
    );

    let telegram = Arc::new(TelegramClient::new(config.telegram_token.clone())?);
    let conversations = Arc::new(ConversationTable::new());
    let queue = Arc::new(JobQueue::new());
    let limiter = Arc::new(RateLimiter::new(settings.requests_per_minute));

    let executor: ProductionExecutor = GenerationExecutor::new(
        generator,
        store.clone(),
        Arc::clone(&telegram),
        Arc::clone(&conversations),
    );
    let runtime: Arc<ProductionRuntime> = Arc::new(BotRuntime::new(
        conversations,
        Arc::clone(&queue),
        store,
        Arc::clone(&telegram),
    ));

    let cancel = CancellationToken::new();
    let ticker = limiter.spawn_epoch_ticker(cancel.clone());
    let dispatcher = Dispatcher::new(queue, limiter, Arc::new(executor));
    let executions = dispatcher.executions();
    let dispatcher = tokio::spawn(dispatcher.run(cancel.clone()));
    let poller = tokio::spawn(telegram::poll(telegram, runtime, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    cancel.cancel();

    for (name, handle) in [("dispatcher", dispatcher), ("poller", poller), ("ticker", ticker)] {
        if let Err(e) = handle.await {
            tracing::error!(task = name, error = %e, "Task ended abnormally");
        }
    }

    // Launched jobs run to completion, bounded by the two generation calls
    let grace = config.openai.request_timeout * 2 + SHUTDOWN_SLACK;
    tracing::info!(in_flight = executions.len(), grace = ?grace, "Waiting for running jobs");
    if tokio::time::timeout(grace, executions.wait()).await.is_err() {
        tracing::warn!(in_flight = executions.len(), "Running jobs did not finish in time");
    }

    tracing::info!("Outfit bot stopped");
    Ok(())
}
