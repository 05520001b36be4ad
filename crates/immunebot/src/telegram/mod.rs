//! Telegram conversation engine

pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
pub mod incoming;
pub mod machine;
pub mod menu;
pub mod messages;
pub mod middleware;
pub mod schema;
pub mod state;
pub mod store;
pub mod transport;

pub use dispatcher::BotEngine;
pub use errors::{BotError, MachineError, StoreError, TransportError};
pub use handlers::{build_machine, HandlerDeps, StateHandler};
pub use incoming::Incoming;
pub use menu::Menu;
pub use schema::{schema, HandlerError};
pub use state::{ChatState, UserData};
pub use store::{CacheStore, DataStore, MemoryStore, StateStore};
pub use transport::{ChatTransport, TeloxideTransport};
