mod cli;

use crate::cli::{CacheBackendArg, Command, LogFormatArg, StorageBackendArg, CLI};
use anyhow::Context;
use clap::Parser;
use jiff::SignedDuration;
use tinylink_cache::{KvCache, MokaKvCache, RedisKvCache};
use tinylink_core::Store;
use tinylink_shortener::{ExpirationPolicy, MappingService, ShortenRequest};
use tinylink_storage::{InMemoryStore, MySqlStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        cache_backend = %config.cache,
        "starting tinylink"
    );

    match config.storage {
        StorageBackendArg::InMemory => with_cache(InMemoryStore::new(), &config).await,
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlStore::connect(mysql_dsn).await?;
            store.migrate().await?;
            with_cache(store, &config).await
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    // Logs go to stderr so stdout carries only the command's output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

async fn with_cache<S: Store>(store: S, config: &CLI) -> anyhow::Result<()> {
    match config.cache {
        CacheBackendArg::Moka => {
            let cache = MokaKvCache::with_capacity(config.cache_capacity);
            run(MappingService::new(store, cache), &config.command).await
        }
        CacheBackendArg::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .context("redis url is required when cache backend is redis")?;
            let cache = RedisKvCache::connect(redis_url).await?;
            run(MappingService::new(store, cache), &config.command).await
        }
    }
}

async fn run<S: Store, C: KvCache>(
    service: MappingService<S, C>,
    command: &Command,
) -> anyhow::Result<()> {
    let mapping = match command {
        Command::Shorten {
            url,
            expire_in,
            max_clicks,
        } => {
            let expiration = match expire_in {
                Some(secs) => {
                    let secs = i64::try_from(*secs).context("--expire-in is too large")?;
                    ExpirationPolicy::AfterDuration(SignedDuration::from_secs(secs))
                }
                None => ExpirationPolicy::Never,
            };
            service
                .shorten_with(ShortenRequest {
                    original_url: url.clone(),
                    expiration,
                    max_clicks: *max_clicks,
                })
                .await?
        }
        Command::Resolve { code } => service.resolve(code).await?,
    };

    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}
