//! Common test utilities
//!
//! This module is shared across all integration tests

pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{callback, message, Harness, ADMIN_TG_ID, MASTER_CODE};
