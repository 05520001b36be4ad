//! Per-update conversation context

use std::sync::Arc;

use immunecore::models::User;

use super::errors::BotError;
use super::incoming::Incoming;
use super::menu::Menu;
use super::state::{ChatState, UserData};
use super::transport::{ChatTransport, Markup, Outgoing};

/// Everything one step of the conversation works with
///
/// `state` and `data` are the values loaded for this update; handlers move the
/// conversation forward by changing them, the dispatcher persists the result.
pub struct Context {
    pub incoming: Incoming,
    pub user: User,
    pub state: ChatState,
    pub data: UserData,
    menu: Arc<Menu>,
    transport: Arc<dyn ChatTransport>,
}

impl Context {
    pub fn new(
        incoming: Incoming,
        user: User,
        state: ChatState,
        data: UserData,
        menu: Arc<Menu>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            incoming,
            user,
            state,
            data,
            menu,
            transport,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    /// Main keyboard for the current user
    pub fn menu_markup(&self) -> Markup {
        self.menu.markup_for(&self.user)
    }

    fn recipient(&self) -> Result<i64, BotError> {
        self.incoming.recipient().ok_or(BotError::NoSender)
    }

    fn callback(&self) -> Result<(&str, Option<(i64, i32)>), BotError> {
        match &self.incoming {
            Incoming::Callback { id, origin, .. } => {
                Ok((id.as_str(), origin.as_ref().map(|o| (o.chat_id, o.message_id))))
            }
            _ => Err(BotError::BadContext("callback")),
        }
    }

    pub async fn send(&self, msg: Outgoing) -> Result<(), BotError> {
        let chat = self.recipient()?;
        self.transport.send_message(chat, msg).await?;
        Ok(())
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), BotError> {
        self.send(Outgoing::text(text)).await
    }

    pub async fn send_photo(&self, png: Vec<u8>, caption: Outgoing) -> Result<(), BotError> {
        let chat = self.recipient()?;
        self.transport.send_photo(chat, png, caption).await?;
        Ok(())
    }

    /// Replies to the triggering message, or just sends when there is none
    pub async fn reply(&self, msg: Outgoing) -> Result<(), BotError> {
        let chat = self.recipient()?;
        match (&self.incoming, self.incoming.message_id()) {
            (Incoming::Message { .. }, Some(message_id)) => self.transport.reply_to(chat, message_id, msg).await?,
            _ => self.transport.send_message(chat, msg).await?,
        }
        Ok(())
    }

    /// Edits the message the pressed callback button belongs to
    pub async fn edit(&self, msg: Outgoing) -> Result<(), BotError> {
        let (_, origin) = self.callback()?;
        let (chat, message_id) = origin.ok_or(BotError::BadContext("callback with message"))?;
        self.transport.edit_text(chat, message_id, msg).await?;
        Ok(())
    }

    /// Answers the callback query, shown as a toast when `text` is set
    pub async fn respond(&self, text: Option<String>) -> Result<(), BotError> {
        let (id, _) = self.callback()?;
        self.transport.answer_callback(id, text).await?;
        Ok(())
    }

    /// Removes inline buttons from the callback's message; no-op for other updates
    pub async fn clear_inline_keyboard(&self) -> Result<(), BotError> {
        if let Ok((_, Some((chat, message_id)))) = self.callback() {
            self.transport.clear_inline_keyboard(chat, message_id).await?;
        }
        Ok(())
    }
}
