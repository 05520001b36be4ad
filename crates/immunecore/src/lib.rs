//! Immune core library
//!
//! Everything that does not talk to Telegram: the user and certificate domain,
//! storage backends, cache, QR rendering, configuration, logging and metrics.

pub mod cache;
pub mod certs;
pub mod codes;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod qr;
pub mod storage;
pub mod users;

pub use error::{AppError, AppResult};
