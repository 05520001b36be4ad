//! Outbound side of the chat
//!
//! Handlers describe what to send with [`Outgoing`]; [`ChatTransport`] delivers it.
//! [`TeloxideTransport`] talks to the Bot API, tests use
//! [`crate::testing::RecordingTransport`].

use async_trait::async_trait;
use teloxide::payloads::{
    AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters, SendPhotoSetters,
};
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, KeyboardButton, KeyboardMarkup,
    KeyboardRemove, MessageId, ParseMode as TgParseMode, ReplyMarkup, ReplyParameters,
};

use super::errors::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Plain,
    Html,
    MarkdownV2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    /// Reply keyboard, rows of button labels
    Keyboard(Vec<Vec<String>>),
    RemoveKeyboard,
    Inline(Vec<Vec<InlineButton>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outgoing {
    pub text: String,
    pub parse_mode: ParseMode,
    pub markup: Option<Markup>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
            markup: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::MarkdownV2,
            markup: None,
        }
    }

    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = Some(markup);
        self
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, msg: Outgoing) -> Result<(), TransportError>;

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: Outgoing) -> Result<(), TransportError>;

    async fn reply_to(&self, chat_id: i64, message_id: i32, msg: Outgoing) -> Result<(), TransportError>;

    async fn edit_text(&self, chat_id: i64, message_id: i32, msg: Outgoing) -> Result<(), TransportError>;

    async fn clear_inline_keyboard(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str, text: Option<String>) -> Result<(), TransportError>;
}

/// Bot API transport
#[derive(Clone)]
pub struct TeloxideTransport {
    bot: Bot,
}

impl TeloxideTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn parse_mode(mode: ParseMode) -> Option<TgParseMode> {
    match mode {
        ParseMode::Plain => None,
        ParseMode::Html => Some(TgParseMode::Html),
        ParseMode::MarkdownV2 => Some(TgParseMode::MarkdownV2),
    }
}

fn inline_markup(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.text.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    }))
}

fn reply_markup(markup: &Markup) -> ReplyMarkup {
    match markup {
        Markup::Keyboard(rows) => ReplyMarkup::Keyboard(
            KeyboardMarkup::new(
                rows.iter()
                    .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>()),
            )
            .resize_keyboard(),
        ),
        Markup::RemoveKeyboard => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
        Markup::Inline(rows) => ReplyMarkup::InlineKeyboard(inline_markup(rows)),
    }
}

#[async_trait]
impl ChatTransport for TeloxideTransport {
    async fn send_message(&self, chat_id: i64, msg: Outgoing) -> Result<(), TransportError> {
        let mut request = self.bot.send_message(ChatId(chat_id), msg.text);
        if let Some(mode) = parse_mode(msg.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(markup) = &msg.markup {
            request = request.reply_markup(reply_markup(markup));
        }
        request.await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, png: Vec<u8>, caption: Outgoing) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::memory(png).file_name("qr.png"))
            .caption(caption.text);
        if let Some(mode) = parse_mode(caption.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(markup) = &caption.markup {
            request = request.reply_markup(reply_markup(markup));
        }
        request.await?;
        Ok(())
    }

    async fn reply_to(&self, chat_id: i64, message_id: i32, msg: Outgoing) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), msg.text)
            .reply_parameters(ReplyParameters::new(MessageId(message_id)));
        if let Some(mode) = parse_mode(msg.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(markup) = &msg.markup {
            request = request.reply_markup(reply_markup(markup));
        }
        request.await?;
        Ok(())
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, msg: Outgoing) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), msg.text);
        if let Some(mode) = parse_mode(msg.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(Markup::Inline(rows)) = &msg.markup {
            request = request.reply_markup(inline_markup(rows));
        }
        request.await?;
        Ok(())
    }

    async fn clear_inline_keyboard(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError> {
        self.bot
            .edit_message_reply_markup(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<String>) -> Result<(), TransportError> {
        let mut request = self.bot.answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await?;
        Ok(())
    }
}
