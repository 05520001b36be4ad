//! Testing utilities for driving the conversation without Telegram
//!
//! ```rust,ignore
//! let transport = Arc::new(RecordingTransport::new());
//! // build the engine over `transport`, feed it updates
//! assert_eq!(transport.texts(), vec!["Выбери что нужно"]);
//! ```

pub mod recorder;

pub use recorder::{RecordingTransport, Sent};
