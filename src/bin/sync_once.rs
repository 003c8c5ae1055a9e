//! One-shot translation run against the configured database, printing the
//! run summary as JSON.
//!
//! Usage:
//!   cargo run --bin sync-once -- post <id> [--force]
//!   cargo run --bin sync-once -- all [--force]
//!   cargo run --bin sync-once -- missing
//!   cargo run --bin sync-once -- languages es,fr [--posts 1,2,3]
//!
//! Uses the same environment as the server (DATABASE_URL, OPENAI_API_KEY, ...).
//! Ctrl-C cancels the run: items in flight finish, the rest are skipped.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use post_translation_sync::{
    config::Config, db::SqliteStore, engine::TranslationSyncEngine, openai::OpenAiProvider,
    planner::TranslationRequest,
};

fn parse_list<T: std::str::FromStr>(value: &str, what: &str) -> Result<Vec<T>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .ok()
                .with_context(|| format!("Invalid {} '{}'", what, s))
        })
        .collect()
}

fn parse_request(args: &[String]) -> Result<TranslationRequest> {
    let force = args.iter().any(|a| a == "--force");
    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();

    match positional.as_slice() {
        ["post", id, ..] => Ok(TranslationRequest::SinglePost {
            post_id: id.parse().with_context(|| format!("Invalid post id '{}'", id))?,
            force,
        }),
        ["all", ..] => Ok(TranslationRequest::AllPosts { force }),
        ["missing", ..] => Ok(TranslationRequest::MissingOnly),
        ["languages", codes, ..] => {
            let post_ids = match args.iter().position(|a| a == "--posts") {
                Some(i) => {
                    let value = args.get(i + 1).context("--posts needs a value")?;
                    Some(parse_list(value, "post id")?)
                }
                None => None,
            };
            Ok(TranslationRequest::ExplicitLanguages {
                language_codes: parse_list(codes, "language code")?,
                post_ids,
            })
        }
        _ => bail!("Usage: sync-once <post <id> | all | missing | languages <codes>> [--force] [--posts <ids>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("post_translation_sync=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = parse_request(&args)?;
    let config = Config::from_env()?;

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_url))?;
    let engine = TranslationSyncEngine::new(
        Arc::new(store),
        Arc::new(OpenAiProvider::from_config(&config)),
        config.engine(),
    );

    let ctx = engine.context();
    let cancel = ctx.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    info!("Running {} translation", request.label());
    let summary = engine.run(&request, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
