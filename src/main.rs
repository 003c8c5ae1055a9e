use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use post_translation_sync::{
    config::Config,
    db::SqliteStore,
    engine::TranslationSyncEngine,
    openai::OpenAiProvider,
    scheduler,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("post_translation_sync=info".parse()?),
        )
        .init();

    info!("Starting post translation sync service");

    let config = Config::from_env()?;

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_url))?;
    info!("Database ready");

    // A single request gets half of the per-item budget
    let request_timeout = Duration::from_secs((config.item_timeout_secs / 2).max(1));
    let provider = OpenAiProvider::from_config(&config).with_request_timeout(request_timeout);

    let engine = Arc::new(TranslationSyncEngine::new(
        Arc::new(store),
        Arc::new(provider),
        config.engine(),
    ));

    let _scheduler = match &config.missing_sweep_schedule {
        Some(schedule) => Some(scheduler::start_scheduler(Arc::clone(&engine), schedule).await?),
        None => {
            info!("MISSING_SWEEP_SCHEDULE not set, scheduled sweep disabled");
            None
        }
    };

    if config.api_key.is_none() {
        info!("API_KEY not set, translation endpoints are unauthenticated");
    }

    let app = server::router(AppState::new(engine, config.api_key.clone()));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
