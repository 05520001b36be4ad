//! Telegram bot issuing QR certificates to invited users
//!
//! - [`telegram`] - conversation engine and the teloxide adapter
//! - [`api`] - certificates HTTP API
//! - [`status`] - health, readiness and metrics endpoints

pub mod api;
pub mod cli;
pub mod status;
pub mod telegram;
pub mod testing;
