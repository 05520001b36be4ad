//! Dispatcher schema
//!
//! The whole update tree is a single endpoint: every update kind goes through
//! [`BotEngine`], which owns routing and the auth gate.

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use super::dispatcher::BotEngine;
use super::incoming::Incoming;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Creates the handler tree used by teloxide's `Dispatcher`
///
/// # Arguments
/// * `engine` - Conversation engine shared by all updates
///
/// # Returns
/// The complete handler tree for the bot
pub fn schema(engine: Arc<BotEngine>) -> UpdateHandler<HandlerError> {
    dptree::entry().endpoint(move |update: Update| {
        let engine = Arc::clone(&engine);
        async move {
            engine.handle_update(Incoming::from_update(&update)).await;
            Ok::<(), HandlerError>(())
        }
    })
}
