//! Reply keyboard shown under the chat

use immunecore::models::User;

use super::transport::Markup;

/// Button labels, built once at startup and shared by reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub info: String,
    pub receive_code: String,
    pub my_invites: String,
    pub add_invites: String,
    pub activate_invite: String,
    /// Telegram id that also sees the admin buttons
    pub admin_telegram_id: Option<u64>,
}

/// What a pressed menu button asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Info,
    ReceiveCode,
    MyInvites,
    AddInvites,
    ActivateInvite,
}

impl Default for Menu {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Menu {
    pub fn new(admin_telegram_id: Option<u64>) -> Self {
        Self {
            info: "Информация".to_string(),
            receive_code: "Получить код".to_string(),
            my_invites: "Мои инвайты".to_string(),
            add_invites: "Добавить инвайты".to_string(),
            activate_invite: "Активировать инвайт".to_string(),
            admin_telegram_id,
        }
    }

    pub fn is_admin(&self, user: &User) -> bool {
        self.admin_telegram_id.is_some() && self.admin_telegram_id == user.telegram_id()
    }

    /// Keyboard matching the user's status
    pub fn markup_for(&self, user: &User) -> Markup {
        if !user.is_active {
            return Markup::Keyboard(vec![vec![self.activate_invite.clone()]]);
        }

        let mut rows = vec![
            vec![self.info.clone(), self.receive_code.clone()],
            vec![self.my_invites.clone()],
        ];
        if self.is_admin(user) {
            rows[1].push(self.add_invites.clone());
        }
        Markup::Keyboard(rows)
    }

    /// Maps a pressed button back to its action
    pub fn action(&self, text: &str) -> Option<MenuAction> {
        let text = text.trim();
        if text == self.info {
            Some(MenuAction::Info)
        } else if text == self.receive_code {
            Some(MenuAction::ReceiveCode)
        } else if text == self.my_invites {
            Some(MenuAction::MyInvites)
        } else if text == self.add_invites {
            Some(MenuAction::AddInvites)
        } else if text == self.activate_invite {
            Some(MenuAction::ActivateInvite)
        } else {
            None
        }
    }
}
