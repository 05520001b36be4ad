//! Persistence contracts and their backends
//!
//! - [`memory`] keeps everything in process, used in tests and for quick local runs
//! - [`sqlite`] is the durable backend (r2d2 pool + refinery migrations)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{Certificate, FindUserFilter, User};

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::{MemoryCertificatesStorage, MemoryUsersStorage};
pub use sqlite::{create_pool, DbPool, SqliteStorage};

#[async_trait]
pub trait UsersStorage: Send + Sync {
    /// `Ok(None)` when nothing matches
    async fn find_user(&self, filter: &FindUserFilter) -> AppResult<Option<User>>;

    /// Owner of the invite with this code, used or not
    async fn find_by_invite(&self, code: &str) -> AppResult<Option<User>>;

    async fn invite_code_exists(&self, code: &str) -> AppResult<bool>;

    async fn create_user(&self, user: &User) -> AppResult<()>;

    /// Persists scalar fields and appends invites that are not stored yet.
    /// Usage of already stored invites is never overwritten here,
    /// only [`UsersStorage::mark_invite_used`] spends an invite.
    ///
    /// Nothing is written when one of the new invite codes is owned by another
    /// user, the call fails with `InviteCodeTaken` instead.
    async fn update_user(&self, user: &User) -> AppResult<()>;

    /// Sets `used_by` and `used_at` together, only if neither is set yet.
    ///
    /// # Returns
    /// * `Ok(true)` - this call claimed the invite
    /// * `Ok(false)` - unknown code or already used
    async fn mark_invite_used(&self, code: &str, user_id: &str, at: DateTime<Utc>) -> AppResult<bool>;

    /// Undoes [`UsersStorage::mark_invite_used`] if `user_id` holds the claim
    async fn release_invite(&self, code: &str, user_id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait CertificatesStorage: Send + Sync {
    async fn list(&self) -> AppResult<Vec<Certificate>>;

    async fn get_by_code(&self, code: &str) -> AppResult<Option<Certificate>>;

    async fn exists(&self, code: &str) -> AppResult<bool>;

    async fn create(&self, cert: &Certificate) -> AppResult<()>;
}
