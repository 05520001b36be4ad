//! Conversation states and per-user scratch data

use immunecore::models::Credentials;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Node of the conversation graph for one user
///
/// Stored by its snake_case name, `started` is the idle state every
/// never-seen user begins in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChatState {
    #[default]
    Started,
    InviteInit,
    InviteRequested,
    GenerateStart,
    CredentialsRequested,
    DateBirthRequested,
    CredentialsConfirmation,
}

impl ChatState {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Scratch record carried across the steps of a flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    pub credentials: Credentials,
    pub invite_notification_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_state_names_roundtrip() {
        for state in ChatState::iter() {
            assert_eq!(ChatState::from_str(state.as_str()).unwrap(), state);
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
        assert_eq!(ChatState::DateBirthRequested.to_string(), "date_birth_requested");
    }

    #[test]
    fn test_user_data_tolerates_missing_fields() {
        let data: UserData = serde_json::from_str("{}").unwrap();
        assert_eq!(data, UserData::default());
    }
}
