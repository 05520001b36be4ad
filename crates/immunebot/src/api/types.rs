//! Request and response bodies

use immunecore::models::{Certificate, Credentials, DATE_FORMAT};
use serde::{Deserialize, Serialize};

use super::error::InvalidFields;

/// Public view of a certificate, the name is masked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    pub name: String,
    pub date_birth: String,
    pub expiring_at: String,
}

impl From<&Certificate> for CertificateView {
    fn from(cert: &Certificate) -> Self {
        Self {
            name: cert.masked_name(),
            date_birth: cert.credentials.date_birth.clone(),
            expiring_at: cert.expiring_at_display(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCertificateData {
    pub first_name: String,
    pub last_name: String,
    pub second_name: String,
    pub date_birth: String,
}

impl NewCertificateData {
    /// Per-field messages, empty when the data is acceptable
    pub fn validate(&self) -> InvalidFields {
        let mut fields = InvalidFields::new();
        let mut add = |field: &str, message: &str| {
            fields.entry(field.to_string()).or_default().push(message.to_string());
        };

        if self.first_name.trim().is_empty() {
            add("firstName", "empty first name given");
        }
        if self.last_name.trim().is_empty() {
            add("lastName", "empty last name given");
        }
        if self.second_name.trim().is_empty() {
            add("secondName", "empty second name given");
        }
        if self.date_birth.trim().is_empty() {
            add("dateBirth", "empty date of birth");
        } else if chrono::NaiveDate::parse_from_str(self.date_birth.trim(), DATE_FORMAT).is_err() {
            add("dateBirth", "date of birth must be DD.MM.YYYY");
        }

        fields
    }

    pub fn into_credentials(self) -> Credentials {
        Credentials {
            last_name: self.last_name.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            second_name: self.second_name.trim().to_string(),
            date_birth: self.date_birth.trim().to_string(),
        }
    }
}
