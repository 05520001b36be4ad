//! Error types of the conversation engine, one enum per layer

use immunecore::AppError;
use thiserror::Error;

use super::state::ChatState;

/// Failure of a per-user store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Nothing stored for this user yet, callers fall back to defaults
    #[error("no value stored for user")]
    Missing,

    #[error("store backend: {0}")]
    Backend(#[from] AppError),

    #[error("stored value is corrupt: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum MachineError {
    /// Handler bound to a state without an outgoing-transition entry
    #[error("state {0} has no transitions declared")]
    StateUnknown(ChatState),

    #[error("transition from {from} to {to} not allowed")]
    TransitionNotAllowed { from: ChatState, to: ChatState },

    #[error("failed to persist state: {0}")]
    StorePersistFailed(#[source] StoreError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error("transport: {0}")]
    Other(String),
}

/// Errors produced while handling one update
///
/// Only [`BotError::Input`] and [`BotError::Domain`] carry text meant for the
/// user. Everything else is reported with a generic apology and logged.
#[derive(Error, Debug)]
pub enum BotError {
    /// Malformed user input, shown verbatim, the step is not left
    #[error("{0}")]
    Input(String),

    /// Expected domain outcome with a fixed user-facing text
    #[error("{0}")]
    Domain(String),

    /// Update without a resolvable sender
    #[error("update has no sender")]
    NoSender,

    /// Operation needs a callback but the update is something else
    #[error("operation requires a {0} update")]
    BadContext(&'static str),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("internal error: {0}")]
    Internal(#[from] AppError),
}

impl BotError {
    pub fn input(message: impl Into<String>) -> Self {
        BotError::Input(message.into())
    }

    pub fn domain(message: impl Into<String>) -> Self {
        BotError::Domain(message.into())
    }

    pub fn is_internal(&self) -> bool {
        !matches!(self, BotError::Input(_) | BotError::Domain(_))
    }

    /// Label for the handler errors metric
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Input(_) => "input",
            BotError::Domain(_) => "domain",
            _ => "internal",
        }
    }
}

impl From<teloxide::RequestError> for BotError {
    fn from(err: teloxide::RequestError) -> Self {
        BotError::Transport(TransportError::Telegram(err))
    }
}
