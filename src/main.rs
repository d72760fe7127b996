use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;

use feedbridge::adapter::{AdapterRegistry, DiscordAdapter, TelegramAdapter};
use feedbridge::cache::Cache;
use feedbridge::config::{CacheBackendKind, Config, LogFormat};
use feedbridge::feed::FeedFetcher;
use feedbridge::scheduler::Scheduler;
use feedbridge::service::{Dispatcher, FeedService, Janitor};
use feedbridge::storage::Database;
use feedbridge::translate;

#[derive(Parser, Debug)]
#[command(name = "feedbridge", about = "Self-hosted RSS/Atom to Discord/Telegram bridge")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "feedbridge.toml")]
    config: PathBuf,
}

fn init_tracing(config: &Config) {
    // RUST_LOG wins over the configured level when set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn ensure_data_dir(database_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
            tracing::info!(path = %parent.display(), "Created data directory");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    init_tracing(&config);
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        discord = config.discord_token.is_some(),
        telegram = config.telegram_token.is_some(),
        translation = config.can_translate(),
        fetch_interval_minutes = config.fetch_interval_minutes,
        "feedbridge starting"
    );

    ensure_data_dir(&config.database_path)?;
    let db = Database::open(&config.database_path).await?;

    let cache = match config.cache_backend {
        CacheBackendKind::Memory => Arc::new(Cache::memory(feedbridge::cache::DEFAULT_MEMORY_CAPACITY)),
        CacheBackendKind::Redis => {
            // validate() guarantees the URL is present
            let url = config.redis_url.as_deref().context("redis_url missing")?;
            Arc::new(Cache::redis(url).await.context("Redis connection failed")?)
        }
    };

    let fetcher = FeedFetcher::new(config.max_concurrent_fetches)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let translator = translate::from_config(&config, fetcher.client(), Some(Arc::clone(&cache)))
        .map(Arc::new);

    // Adapters are wired from whichever tokens are configured
    let mut registry = AdapterRegistry::new();
    if let Some(token) = &config.discord_token {
        registry.register(Arc::new(DiscordAdapter::new(
            fetcher.client().clone(),
            SecretString::from(token.as_str()),
        )));
    }
    if let Some(token) = &config.telegram_token {
        registry.register(Arc::new(TelegramAdapter::new(
            fetcher.client().clone(),
            SecretString::from(token.as_str()),
        )));
    }
    let registry = Arc::new(registry);
    registry.start_all().await.context("Adapter startup failed")?;

    let feed_service = Arc::new(FeedService::new(db.clone(), fetcher));
    let dispatcher = Arc::new(Dispatcher::new(
        db.clone(),
        Arc::clone(&feed_service),
        translator,
        Arc::clone(&registry),
        Duration::from_millis(config.send_delay_ms),
    ));
    let janitor = Arc::new(Janitor::new(db.clone(), config.entry_retention_days));

    let scheduler = Scheduler::new();

    let job_dispatcher = Arc::clone(&dispatcher);
    scheduler
        .add(
            "dispatch",
            Duration::from_secs(config.fetch_interval_minutes * 60),
            move || {
                let dispatcher = Arc::clone(&job_dispatcher);
                async move {
                    dispatcher.dispatch_once().await;
                }
            },
        )
        .await;

    let job_janitor = Arc::clone(&janitor);
    scheduler
        .add(
            "cleanup",
            Duration::from_secs(config.cleanup_interval_hours * 3600),
            move || {
                let janitor = Arc::clone(&job_janitor);
                async move {
                    janitor.cleanup_once().await;
                }
            },
        )
        .await;

    scheduler.start().await;
    tracing::info!("feedbridge running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("Signal handler failed")?;
    tracing::info!("Shutting down");

    // In-flight sends are abandoned; without receipts they replay next start
    scheduler.shutdown(false).await;
    registry.stop_all().await;
    db.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
