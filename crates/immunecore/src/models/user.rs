use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram identity attached to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramData {
    pub id: u64,
    pub username: Option<String>,
}

/// Single-use code owned by the user who may hand it out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub code: String,
    pub used_by: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
}

impl Invite {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            used_by: None,
            used_at: None,
        }
    }

    /// Usage is recorded as a pair, either field being set means the invite is spent.
    pub fn is_used(&self) -> bool {
        self.used_by.is_some() || self.used_at.is_some()
    }

    pub fn mark_used(&mut self, user_id: &str, at: DateTime<Utc>) {
        self.used_by = Some(user_id.to_string());
        self.used_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub name: String,
    pub invites: Vec<Invite>,
    pub invited_by: Option<String>,
    pub qr_generations_left: u32,
    pub telegram: Option<TelegramData>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn telegram_id(&self) -> Option<u64> {
        self.telegram.as_ref().map(|t| t.id)
    }

    pub fn unused_invites(&self) -> Vec<Invite> {
        self.invites.iter().filter(|i| !i.is_used()).cloned().collect()
    }

    pub fn owns_invite(&self, code: &str) -> bool {
        self.invites.iter().any(|i| i.code == code)
    }
}

/// Lookup criteria, every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindUserFilter {
    pub id: Option<String>,
    pub telegram_id: Option<u64>,
}

impl FindUserFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_telegram_id(telegram_id: u64) -> Self {
        Self {
            telegram_id: Some(telegram_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.id.as_ref().is_none_or(|id| &user.id == id)
            && self
                .telegram_id
                .is_none_or(|tg| user.telegram_id() == Some(tg))
    }
}

/// Data used to seed a user on first contact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub telegram_id: u64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl NewUser {
    /// "Last First", trimmed when one of the parts is missing
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name.as_deref().unwrap_or_default(), self.first_name)
            .trim()
            .to_string()
    }

    pub fn login(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.telegram_id.to_string())
    }
}
