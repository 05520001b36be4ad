//! Inbound updates as one tagged union
//!
//! Every accessor (sender, text, data, args) resolves through a single match,
//! so the precedence rules live in one place.

use teloxide::types::{MaybeInaccessibleMessage, Update, UpdateKind, User as TgUser};

/// Separator of callback payload arguments
pub const CALLBACK_ARGS_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl From<&TgUser> for Sender {
    fn from(user: &TgUser) -> Self {
        Self {
            id: user.id.0,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Message a callback button was attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOrigin {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Message {
        chat_id: i64,
        message_id: i32,
        sender: Option<Sender>,
        text: Option<String>,
    },
    Callback {
        id: String,
        sender: Sender,
        origin: Option<CallbackOrigin>,
        data: Option<String>,
    },
    InlineQuery {
        sender: Sender,
        query: String,
    },
    ChosenInlineResult {
        sender: Sender,
        query: String,
    },
    ShippingQuery {
        sender: Sender,
        payload: String,
    },
    PreCheckoutQuery {
        sender: Sender,
        payload: String,
    },
    PollAnswer {
        sender: Option<Sender>,
    },
    Other,
}

impl Incoming {
    pub fn from_update(update: &Update) -> Self {
        match &update.kind {
            UpdateKind::Message(msg) => Incoming::Message {
                chat_id: msg.chat.id.0,
                message_id: msg.id.0,
                sender: msg.from.as_ref().map(Sender::from),
                text: msg.text().map(str::to_string),
            },
            UpdateKind::CallbackQuery(q) => Incoming::Callback {
                id: q.id.to_string(),
                sender: Sender::from(&q.from),
                origin: q.message.as_ref().map(|m| CallbackOrigin {
                    chat_id: m.chat().id.0,
                    message_id: m.id().0,
                    text: match m {
                        MaybeInaccessibleMessage::Regular(m) => m.text().map(str::to_string),
                        MaybeInaccessibleMessage::Inaccessible(_) => None,
                    },
                }),
                data: q.data.clone(),
            },
            UpdateKind::InlineQuery(q) => Incoming::InlineQuery {
                sender: Sender::from(&q.from),
                query: q.query.clone(),
            },
            UpdateKind::ChosenInlineResult(r) => Incoming::ChosenInlineResult {
                sender: Sender::from(&r.from),
                query: r.query.clone(),
            },
            UpdateKind::ShippingQuery(q) => Incoming::ShippingQuery {
                sender: Sender::from(&q.from),
                payload: q.invoice_payload.clone(),
            },
            UpdateKind::PreCheckoutQuery(q) => Incoming::PreCheckoutQuery {
                sender: Sender::from(&q.from),
                payload: q.invoice_payload.clone(),
            },
            UpdateKind::PollAnswer(_) => Incoming::PollAnswer {
                sender: update.from().map(Sender::from),
            },
            _ => Incoming::Other,
        }
    }

    /// Label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Incoming::Message { .. } => "message",
            Incoming::Callback { .. } => "callback",
            Incoming::InlineQuery { .. } => "inline_query",
            Incoming::ChosenInlineResult { .. } => "chosen_inline_result",
            Incoming::ShippingQuery { .. } => "shipping_query",
            Incoming::PreCheckoutQuery { .. } => "pre_checkout_query",
            Incoming::PollAnswer { .. } => "poll_answer",
            Incoming::Other => "other",
        }
    }

    /// Sender, in order: message, callback, inline query, chosen inline result,
    /// shipping query, pre-checkout query, poll answer
    pub fn sender(&self) -> Option<&Sender> {
        match self {
            Incoming::Message { sender, .. } => sender.as_ref(),
            Incoming::Callback { sender, .. } => Some(sender),
            Incoming::InlineQuery { sender, .. } => Some(sender),
            Incoming::ChosenInlineResult { sender, .. } => Some(sender),
            Incoming::ShippingQuery { sender, .. } => Some(sender),
            Incoming::PreCheckoutQuery { sender, .. } => Some(sender),
            Incoming::PollAnswer { sender } => sender.as_ref(),
            Incoming::Other => None,
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Incoming::Message { chat_id, .. } => Some(*chat_id),
            Incoming::Callback { origin, .. } => origin.as_ref().map(|o| o.chat_id),
            _ => None,
        }
    }

    /// Where replies go: the chat when known, otherwise the sender's private chat
    pub fn recipient(&self) -> Option<i64> {
        self.chat_id().or_else(|| self.sender().map(|s| s.id as i64))
    }

    /// Message text, or the text of the message a callback button belongs to
    pub fn text(&self) -> &str {
        match self {
            Incoming::Message { text, .. } => text.as_deref().unwrap_or_default(),
            Incoming::Callback { origin, .. } => origin
                .as_ref()
                .and_then(|o| o.text.as_deref())
                .unwrap_or_default(),
            _ => "",
        }
    }

    /// Command payload, callback data or query text depending on the variant
    pub fn data(&self) -> &str {
        match self {
            Incoming::Message { text, .. } => command_payload(text.as_deref().unwrap_or_default()),
            Incoming::Callback { data, .. } => data.as_deref().unwrap_or_default(),
            Incoming::InlineQuery { query, .. } | Incoming::ChosenInlineResult { query, .. } => query,
            Incoming::ShippingQuery { payload, .. } | Incoming::PreCheckoutQuery { payload, .. } => payload,
            Incoming::PollAnswer { .. } | Incoming::Other => "",
        }
    }

    /// Command arguments split by a single space, callback arguments split by `|`
    pub fn args(&self) -> Vec<String> {
        match self {
            Incoming::Callback { .. } => {
                let data = self.data();
                if data.is_empty() {
                    return Vec::new();
                }
                data.split(CALLBACK_ARGS_SEPARATOR).map(str::to_string).collect()
            }
            _ => {
                let payload = self.data().trim();
                if payload.is_empty() {
                    return Vec::new();
                }
                payload.split(' ').map(str::to_string).collect()
            }
        }
    }

    /// Text the user typed or the callback data they pressed
    pub fn input(&self) -> &str {
        match self {
            Incoming::Callback { .. } => self.data(),
            _ => self.text(),
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Incoming::Callback { .. })
    }

    pub fn message_id(&self) -> Option<i32> {
        match self {
            Incoming::Message { message_id, .. } => Some(*message_id),
            Incoming::Callback { origin, .. } => origin.as_ref().map(|o| o.message_id),
            _ => None,
        }
    }
}

/// `"/start ref 1"` -> `"ref 1"`, plain text has no payload
fn command_payload(text: &str) -> &str {
    if !text.starts_with('/') {
        return "";
    }
    text.split_once(' ').map(|(_, rest)| rest).unwrap_or_default()
}
