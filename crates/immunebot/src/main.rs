use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use backon::{ExponentialBuilder, Retryable};
use dotenvy::dotenv;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use teloxide::update_listeners::Polling;
use tokio_util::sync::CancellationToken;

use immunebot::cli::{Cli, Commands};
use immunebot::status::Readiness;
use immunebot::telegram::{
    build_machine, schema, BotEngine, CacheStore, DataStore, HandlerDeps, MemoryStore, Menu, StateStore,
    TeloxideTransport,
};
use immunebot::{api, status};
use immunecore::cache::{Cache, KvCache, MemoryCache, RedisCache};
use immunecore::certs::Certificates;
use immunecore::config::{AppConfig, RedisConfig, StorageKind};
use immunecore::logging::init_logger;
use immunecore::metrics::Metrics;
use immunecore::qr::PngQrGenerator;
use immunecore::storage::{
    create_pool, CertificatesStorage, MemoryCertificatesStorage, MemoryUsersStorage, SqliteStorage, UsersStorage,
};
use immunecore::users::{Users, UsersOptions};

/// Redis connection attempts at startup
const REDIS_CONNECT_ATTEMPTS: usize = 5;

/// Main entry point
///
/// # Errors
/// Returns an error if initialization fails (config, logging, storage, bot).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    let config = AppConfig::load(&cli.config)?;
    init_logger(&config.log)?;

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    match cli.command() {
        Commands::Run { webhook } => {
            log::info!("Running bot (webhook: {})", webhook);
            run_bot(config, webhook).await
        }
    }
}

/// Redis when configured, the in-process cache otherwise
async fn connect_cache(config: &RedisConfig) -> Result<(Arc<dyn KvCache>, bool)> {
    let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) else {
        log::info!("Redis is not configured, using in-memory cache");
        return Ok((Arc::new(MemoryCache::new()), false));
    };

    let redis = (|| async { RedisCache::connect(url).await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_times(REDIS_CONNECT_ATTEMPTS),
        )
        .notify(|err, delay| log::warn!("Redis is not reachable (retrying in {:?}): {}", delay, err))
        .await?;
    redis.ping().await?;

    Ok((Arc::new(redis), true))
}

fn open_storage(config: &AppConfig) -> Result<(Arc<dyn UsersStorage>, Arc<dyn CertificatesStorage>)> {
    match config.storage.kind {
        StorageKind::Memory => {
            log::warn!("Using in-memory storage, data is lost on restart");
            Ok((
                Arc::new(MemoryUsersStorage::new()),
                Arc::new(MemoryCertificatesStorage::new()),
            ))
        }
        StorageKind::Sqlite => {
            let pool = create_pool(&config.storage.sqlite_path)?;
            log::info!("Using SQLite storage at {}", config.storage.sqlite_path);
            let storage = Arc::new(SqliteStorage::new(pool));
            Ok((storage.clone(), storage))
        }
    }
}

/// Run the Telegram bot together with the API and status servers
async fn run_bot(config: AppConfig, use_webhook: bool) -> Result<()> {
    let started = std::time::Instant::now();
    log::info!("Starting bot...");

    let shutdown = CancellationToken::new();
    let readiness = Arc::new(Readiness::new());
    let metrics = Arc::new(Metrics::new()?);

    let status_task = tokio::spawn(status::serve(
        config.status_http.addr,
        Arc::clone(&metrics),
        Arc::clone(&readiness),
        shutdown.clone(),
    ));

    let (backend, is_redis) = connect_cache(&config.redis).await?;
    let cache = Cache::new(backend, config.redis.key_prefix.clone());
    let (users_storage, certs_storage) = open_storage(&config)?;

    let deps = HandlerDeps {
        users: Arc::new(Users::new(
            users_storage,
            UsersOptions::from_config(&config.invites, config.telegram.admin_id),
        )),
        certs: Arc::new(Certificates::new(certs_storage, cache.clone())),
        qr: Arc::new(PngQrGenerator::new(config.qr.url_pattern.clone())),
        metrics: Arc::clone(&metrics),
    };

    // Conversation state must survive restarts when redis is there
    let (states, data): (Arc<dyn StateStore>, Arc<dyn DataStore>) = if is_redis {
        let store = Arc::new(CacheStore::new(cache.clone()));
        (store.clone(), store)
    } else {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), store)
    };

    let machine = Arc::new(build_machine(states, &deps)?);
    let bot = Bot::new(config.telegram.token.expose_secret());
    let engine = Arc::new(BotEngine::new(
        machine,
        data,
        &deps,
        Arc::new(TeloxideTransport::new(bot.clone())),
        Arc::new(Menu::new(config.telegram.admin_id)),
    ));

    let api_task = tokio::spawn(api::serve(config.http.addr, Arc::clone(&deps.certs), shutdown.clone()));

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema(engine))
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build();

    readiness.set_ready(true);
    log::info!("Bot initialization complete in {:.2}s", started.elapsed().as_secs_f64());

    let webhook = if use_webhook {
        config.telegram.webhook_url.as_deref().zip(config.telegram.listen_addr)
    } else {
        None
    };

    match webhook {
        Some((url, listen_addr)) => {
            log::info!("Starting bot in webhook mode at {}", url);
            let listener = webhooks::axum(bot, webhooks::Options::new(listen_addr, url::Url::parse(url)?)).await?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;
        }
        None => {
            if use_webhook {
                log::warn!("Webhook mode requested but telegram.webhook_url is not set, falling back to polling");
            }
            log::info!("Starting bot in long polling mode");
            let listener = Polling::builder(bot).drop_pending_updates().build();
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;
        }
    }

    log::info!("Dispatcher stopped, shutting down servers");
    readiness.set_ready(false);
    shutdown.cancel();

    for (name, task) in [("status", status_task), ("api", api_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("{} server failed: {}", name, e),
            Err(e) => log::error!("{} server task panicked: {}", name, e),
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
