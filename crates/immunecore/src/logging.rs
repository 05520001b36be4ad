//! Logging initialization
//!
//! One `tracing` subscriber for the whole process. Records emitted through the
//! `log` facade (teloxide, r2d2, our own `log::` calls) are forwarded into it.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Initialize the global subscriber
///
/// `RUST_LOG` wins over `log.level` when both are present.
///
/// # Arguments
/// * `config` - Log section of the application config
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - A global logger was already installed
pub fn init_logger(config: &LogConfig) -> Result<()> {
    tracing_log::LogTracer::init().map_err(|e| anyhow::anyhow!("Failed to bridge log records: {}", e))?;

    let filter = build_filter(&config.level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.raw {
        let subscriber = builder.with_ansi(false).with_target(false).compact().finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        tracing::subscriber::set_global_default(builder.with_target(true).finish())
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
