//! Transport that records every outbound call instead of sending it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::telegram::errors::TransportError;
use crate::telegram::transport::{ChatTransport, Outgoing};

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message { chat_id: i64, msg: Outgoing },
    Photo { chat_id: i64, png: Vec<u8>, caption: Outgoing },
    Reply { chat_id: i64, message_id: i32, msg: Outgoing },
    Edit { chat_id: i64, message_id: i32, msg: Outgoing },
    ClearKeyboard { chat_id: i64, message_id: i32 },
    CallbackAnswer { callback_id: String, text: Option<String> },
}

impl Sent {
    /// Text of a message, reply, edit or photo caption
    pub fn text(&self) -> Option<&str> {
        match self {
            Sent::Message { msg, .. } | Sent::Reply { msg, .. } | Sent::Edit { msg, .. } => Some(&msg.text),
            Sent::Photo { caption, .. } => Some(&caption.text),
            Sent::ClearKeyboard { .. } | Sent::CallbackAnswer { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    /// Makes every message and photo send fail
    fail_sends: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// All calls recorded so far, oldest first
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Texts of everything with a text, oldest first
    pub fn texts(&self) -> Vec<String> {
        self.sent().iter().filter_map(|s| s.text().map(str::to_string)).collect()
    }

    pub fn photos(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo { png, .. } => Some(png),
                _ => None,
            })
            .collect()
    }

    /// Last recorded call with a text
    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    /// Returns and forgets everything recorded so far
    pub fn take(&self) -> Vec<Sent> {
        self.sent.lock().map(|mut sent| std::mem::take(&mut *sent)).unwrap_or_default()
    }

    fn record(&self, call: Sent) -> Result<(), TransportError> {
        let is_send = matches!(call, Sent::Message { .. } | Sent::Photo { .. } | Sent::Reply { .. });
        if is_send && self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Other("send disabled".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| TransportError::Other(e.to_string()))?
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, msg: Outgoing) -> Result<(), TransportError> {
        self.record(Sent::Message { chat_id, msg })
    }

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: Outgoing) -> Result<(), TransportError> {
        self.record(Sent::Photo { chat_id, png, caption })
    }

    async fn reply_to(&self, chat_id: i64, message_id: i32, msg: Outgoing) -> Result<(), TransportError> {
        self.record(Sent::Reply {
            chat_id,
            message_id,
            msg,
        })
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, msg: Outgoing) -> Result<(), TransportError> {
        self.record(Sent::Edit {
            chat_id,
            message_id,
            msg,
        })
    }

    async fn clear_inline_keyboard(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError> {
        self.record(Sent::ClearKeyboard { chat_id, message_id })
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<String>) -> Result<(), TransportError> {
        self.record(Sent::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text,
        })
    }
}
