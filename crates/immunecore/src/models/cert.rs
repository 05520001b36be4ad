use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display format for dates shown to users and returned by the API
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Person the certificate is issued to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub last_name: String,
    pub first_name: String,
    pub second_name: String,
    /// `DD.MM.YYYY`, validated on input
    pub date_birth: String,
}

impl Credentials {
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.last_name, self.first_name, self.second_name)
            .trim()
            .to_string()
    }

    pub fn is_empty(&self) -> bool {
        self == &Credentials::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub code: String,
    pub owner_id: Option<String>,
    pub credentials: Credentials,
    pub expiring_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// Every name part reduced to its first letter followed by asterisks
    ///
    /// "Иванов Иван Иванович" -> "И***** И*** И*******"
    pub fn masked_name(&self) -> String {
        [
            &self.credentials.last_name,
            &self.credentials.first_name,
            &self.credentials.second_name,
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(|part| mask(part))
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn expiring_at_display(&self) -> String {
        self.expiring_at.format(DATE_FORMAT).to_string()
    }
}

fn mask(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => std::iter::once(first).chain(chars.map(|_| '*')).collect(),
        None => String::new(),
    }
}

/// Input for certificate creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCertificate {
    pub owner_id: Option<String>,
    pub credentials: Credentials,
}
