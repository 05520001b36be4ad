use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CertificatesStorage, UsersStorage};
use crate::error::{AppError, AppResult};
use crate::models::{Certificate, FindUserFilter, User};

/// In-process users store
///
/// A single lock guards all users so invite claims are atomic across owners.
#[derive(Default)]
pub struct MemoryUsersStorage {
    users: RwLock<Vec<User>>,
}

impl MemoryUsersStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsersStorage for MemoryUsersStorage {
    async fn find_user(&self, filter: &FindUserFilter) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| filter.matches(u)).cloned())
    }

    async fn find_by_invite(&self, code: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.owns_invite(code)).cloned())
    }

    async fn invite_code_exists(&self, code: &str) -> AppResult<bool> {
        let users = self.users.read().await;
        Ok(users.iter().any(|u| u.owns_invite(code)))
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.id == user.id) {
            return Err(AppError::Validation(format!("user {} already exists", user.id)));
        }
        users.push(user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        let mut users = self.users.write().await;
        let taken = user
            .invites
            .iter()
            .find(|invite| users.iter().any(|u| u.id != user.id && u.owns_invite(&invite.code)));
        if let Some(invite) = taken {
            return Err(AppError::InviteCodeTaken {
                code: invite.code.clone(),
            });
        }

        let stored = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(AppError::UserNotFound)?;

        stored.login = user.login.clone();
        stored.name = user.name.clone();
        stored.invited_by = user.invited_by.clone();
        stored.qr_generations_left = user.qr_generations_left;
        stored.telegram = user.telegram.clone();
        stored.is_active = user.is_active;
        stored.updated_at = user.updated_at;

        for invite in &user.invites {
            if !stored.owns_invite(&invite.code) {
                stored.invites.push(invite.clone());
            }
        }
        Ok(())
    }

    async fn mark_invite_used(&self, code: &str, user_id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let mut users = self.users.write().await;
        let invite = users
            .iter_mut()
            .flat_map(|u| u.invites.iter_mut())
            .find(|i| i.code == code);

        match invite {
            Some(invite) if !invite.is_used() => {
                invite.mark_used(user_id, at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_invite(&self, code: &str, user_id: &str) -> AppResult<()> {
        let mut users = self.users.write().await;
        let claimed = users
            .iter_mut()
            .flat_map(|u| u.invites.iter_mut())
            .find(|i| i.code == code && i.used_by.as_deref() == Some(user_id));
        if let Some(invite) = claimed {
            invite.used_by = None;
            invite.used_at = None;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCertificatesStorage {
    certs: RwLock<Vec<Certificate>>,
}

impl MemoryCertificatesStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificatesStorage for MemoryCertificatesStorage {
    async fn list(&self) -> AppResult<Vec<Certificate>> {
        Ok(self.certs.read().await.clone())
    }

    async fn get_by_code(&self, code: &str) -> AppResult<Option<Certificate>> {
        let certs = self.certs.read().await;
        Ok(certs.iter().find(|c| c.code == code).cloned())
    }

    async fn exists(&self, code: &str) -> AppResult<bool> {
        Ok(self.certs.read().await.iter().any(|c| c.code == code))
    }

    async fn create(&self, cert: &Certificate) -> AppResult<()> {
        let mut certs = self.certs.write().await;
        if certs.iter().any(|c| c.code == cert.code) {
            return Err(AppError::Validation(format!("certificate {} already exists", cert.code)));
        }
        certs.push(cert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Invite, TelegramData};
    use pretty_assertions::assert_eq;

    fn user(id: &str, tg: u64, invites: &[&str]) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            login: id.into(),
            name: id.into(),
            invites: invites.iter().map(|c| Invite::new(*c)).collect(),
            invited_by: None,
            qr_generations_left: 1,
            telegram: Some(TelegramData { id: tg, username: None }),
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_mark_invite_used_exactly_once() {
        let storage = MemoryUsersStorage::new();
        storage.create_user(&user("owner", 1, &["AAAA"])).await.unwrap();

        assert!(storage.mark_invite_used("AAAA", "u2", Utc::now()).await.unwrap());
        assert!(!storage.mark_invite_used("AAAA", "u3", Utc::now()).await.unwrap());
        assert!(!storage.mark_invite_used("ZZZZ", "u3", Utc::now()).await.unwrap());

        let owner = storage.find_by_invite("AAAA").await.unwrap().unwrap();
        assert_eq!(owner.invites[0].used_by.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_update_keeps_stored_invite_usage() {
        let storage = MemoryUsersStorage::new();
        let stale = user("owner", 1, &["AAAA"]);
        storage.create_user(&stale).await.unwrap();
        storage.mark_invite_used("AAAA", "u2", Utc::now()).await.unwrap();

        let mut stale = stale;
        stale.invites.push(Invite::new("BBBB"));
        stale.is_active = true;
        storage.update_user(&stale).await.unwrap();

        let stored = storage
            .find_user(&FindUserFilter::by_id("owner"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.invites.len(), 2);
        assert!(stored.invites[0].is_used());
        assert!(!stored.invites[1].is_used());
    }

    #[tokio::test]
    async fn test_update_rejects_code_of_another_user() {
        let storage = MemoryUsersStorage::new();
        storage.create_user(&user("owner", 1, &["AAAA"])).await.unwrap();
        let mut other = user("other", 2, &[]);
        storage.create_user(&other).await.unwrap();

        other.invites.push(Invite::new("AAAA"));
        other.is_active = true;
        let err = storage.update_user(&other).await.unwrap_err();
        assert!(matches!(err, AppError::InviteCodeTaken { ref code } if code == "AAAA"));

        let stored = storage.find_user(&FindUserFilter::by_id("other")).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.invites.is_empty());
    }

    #[tokio::test]
    async fn test_release_invite_only_by_claimer() {
        let storage = MemoryUsersStorage::new();
        storage.create_user(&user("owner", 1, &["AAAA"])).await.unwrap();
        storage.mark_invite_used("AAAA", "u2", Utc::now()).await.unwrap();

        storage.release_invite("AAAA", "u3").await.unwrap();
        assert!(!storage.mark_invite_used("AAAA", "u3", Utc::now()).await.unwrap());

        storage.release_invite("AAAA", "u2").await.unwrap();
        assert!(storage.mark_invite_used("AAAA", "u3", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let storage = MemoryUsersStorage::new();
        let err = storage.update_user(&user("ghost", 1, &[])).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }
}
