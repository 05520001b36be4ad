//! Users and invites
//!
//! A user starts inactive and becomes active by redeeming an invite, either one
//! owned by another user or the configured master code. Every activated user
//! gets invites of their own to hand out.

use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use chrono::Utc;
use uuid::Uuid;

use crate::codes::generate_code;
use crate::config::{defaults, InvitesConfig};
use crate::error::{AppError, AppResult};
use crate::models::{FindUserFilter, Invite, NewUser, TelegramData, User};
use crate::storage::UsersStorage;

/// Attempts at finding an invite code nobody owns yet
const INVITE_CODE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait UsersService: Send + Sync {
    /// Finds a user by `filter` or creates one from `seed`
    async fn find_or_create_user(&self, filter: &FindUserFilter, seed: &NewUser) -> AppResult<User>;

    /// Redeems `code` for the user and activates them
    ///
    /// # Errors
    /// * `NoInvite` - unknown or already used code
    /// * `SelfInvite` - the user owns the code
    /// * `AlreadyActive` - nothing to activate
    async fn activate_invite(&self, user_id: &str, code: &str) -> AppResult<User>;

    /// Unused invites of the user
    async fn get_user_invites(&self, user_id: &str) -> AppResult<Vec<Invite>>;

    /// Generates another batch of invites for the user
    async fn add_invites_to_user(&self, user: &User) -> AppResult<User>;

    /// Spends one QR generation, never going below zero
    async fn use_qr_generation(&self, user_id: &str) -> AppResult<User>;

    fn is_admin(&self, user: &User) -> bool;
}

#[derive(Debug, Clone, Builder)]
pub struct UsersOptions {
    /// Master code activating any user without an owner
    pub unique_code: Option<String>,
    pub admin_telegram_id: Option<u64>,
    #[builder(default = defaults::invites::CODE_LEN)]
    pub code_len: usize,
    #[builder(default = defaults::invites::PER_USER)]
    pub per_user: usize,
    #[builder(default = defaults::invites::PER_ADMIN)]
    pub per_admin: usize,
    #[builder(default = defaults::invites::ADMIN_QR_GENERATIONS)]
    pub admin_qr_generations: u32,
    #[builder(default = defaults::invites::USER_QR_GENERATIONS)]
    pub user_qr_generations: u32,
}

impl UsersOptions {
    pub fn from_config(config: &InvitesConfig, admin_telegram_id: Option<u64>) -> Self {
        Self::builder()
            .maybe_unique_code(config.unique_code.clone().filter(|c| !c.is_empty()))
            .maybe_admin_telegram_id(admin_telegram_id)
            .code_len(config.code_len)
            .per_user(config.per_user)
            .per_admin(config.per_admin)
            .admin_qr_generations(config.admin_qr_generations)
            .user_qr_generations(config.user_qr_generations)
            .build()
    }
}

pub struct Users {
    storage: Arc<dyn UsersStorage>,
    options: UsersOptions,
}

impl Users {
    pub fn new(storage: Arc<dyn UsersStorage>, options: UsersOptions) -> Self {
        Self { storage, options }
    }

    fn is_admin_telegram(&self, telegram_id: Option<u64>) -> bool {
        self.options.admin_telegram_id.is_some() && self.options.admin_telegram_id == telegram_id
    }

    async fn get_user(&self, user_id: &str) -> AppResult<User> {
        self.storage
            .find_user(&FindUserFilter::by_id(user_id))
            .await?
            .ok_or(AppError::UserNotFound)
    }

    async fn create_user(&self, seed: &NewUser) -> AppResult<User> {
        log::info!("Creating new user for telegram id {}", seed.telegram_id);

        let now = Utc::now();
        let qr_generations_left = if self.is_admin_telegram(Some(seed.telegram_id)) {
            self.options.admin_qr_generations
        } else {
            self.options.user_qr_generations
        };

        let user = User {
            id: Uuid::new_v4().to_string(),
            login: seed.login(),
            name: seed.display_name(),
            invites: Vec::new(),
            invited_by: None,
            qr_generations_left,
            telegram: Some(TelegramData {
                id: seed.telegram_id,
                username: seed.username.clone(),
            }),
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_user(&user).await?;
        Ok(user)
    }

    /// New invite code that no user owns yet and that is not in `batch`
    async fn create_invite(&self, batch: &[Invite]) -> AppResult<Invite> {
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = generate_code(self.options.code_len);
            let in_batch = batch.iter().any(|i| i.code == code);
            if !in_batch && !self.storage.invite_code_exists(&code).await? {
                return Ok(Invite::new(code));
            }
            log::debug!("Invite code collision, retrying");
        }
        Err(AppError::CodeGenerationExhausted {
            attempts: INVITE_CODE_ATTEMPTS,
        })
    }

    async fn generate_invites_for(&self, user: &mut User) -> AppResult<()> {
        let count = if self.is_admin(user) {
            self.options.per_admin
        } else {
            self.options.per_user
        };

        for _ in 0..count {
            let invite = self.create_invite(&user.invites).await?;
            user.invites.push(invite);
        }
        Ok(())
    }

    /// Stores `user` with a fresh batch of invites
    ///
    /// Codes are checked before the write, so a concurrent activation can take
    /// one in between. The storage refuses such a write and the batch is
    /// generated again.
    async fn save_with_new_invites(&self, user: &User) -> AppResult<User> {
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let mut candidate = user.clone();
            self.generate_invites_for(&mut candidate).await?;
            match self.storage.update_user(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(AppError::InviteCodeTaken { code }) => {
                    log::debug!("Invite code {} was taken before the write, regenerating", code);
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::CodeGenerationExhausted {
            attempts: INVITE_CODE_ATTEMPTS,
        })
    }

    /// `Ok(None)` for the master code
    async fn invite_owner(&self, code: &str) -> AppResult<Option<User>> {
        if self.options.unique_code.as_deref() == Some(code) {
            log::info!("Received unique invite code");
            return Ok(None);
        }

        let owner = self.storage.find_by_invite(code).await?.ok_or(AppError::NoInvite)?;
        let unused = owner.invites.iter().any(|i| i.code == code && !i.is_used());
        if !unused {
            return Err(AppError::NoInvite);
        }
        Ok(Some(owner))
    }
}

#[async_trait]
impl UsersService for Users {
    async fn find_or_create_user(&self, filter: &FindUserFilter, seed: &NewUser) -> AppResult<User> {
        match self.storage.find_user(filter).await? {
            Some(user) => Ok(user),
            None => self.create_user(seed).await,
        }
    }

    async fn activate_invite(&self, user_id: &str, code: &str) -> AppResult<User> {
        log::debug!("Activating invite for user {}", user_id);
        let code = code.trim();

        let mut user = self.get_user(user_id).await?;
        if user.is_active {
            return Err(AppError::AlreadyActive);
        }

        let owner = self.invite_owner(code).await?;
        if let Some(owner) = &owner {
            if owner.id == user.id {
                return Err(AppError::SelfInvite);
            }
            if !self.storage.mark_invite_used(code, &user.id, Utc::now()).await? {
                // Someone else claimed it between the lookup and now
                return Err(AppError::NoInvite);
            }
            user.invited_by = Some(owner.id.clone());
        }

        user.is_active = true;
        user.updated_at = Utc::now();
        match self.save_with_new_invites(&user).await {
            Ok(user) => {
                log::debug!("Invites generated: {}", user.invites.len());
                Ok(user)
            }
            Err(e) => {
                // The user stays inactive, so the claimed invite must stay redeemable
                if owner.is_some() {
                    log::warn!("Activation of user {} failed, releasing invite {}: {}", user.id, code, e);
                    if let Err(release_err) = self.storage.release_invite(code, &user.id).await {
                        log::error!("Failed to release invite {}: {}", code, release_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn get_user_invites(&self, user_id: &str) -> AppResult<Vec<Invite>> {
        log::debug!("Loading invites of user {}", user_id);
        Ok(self.get_user(user_id).await?.unused_invites())
    }

    async fn add_invites_to_user(&self, user: &User) -> AppResult<User> {
        log::info!("Adding more invites to user {}", user.id);
        let mut user = self.get_user(&user.id).await?;
        user.updated_at = Utc::now();
        self.save_with_new_invites(&user).await
    }

    async fn use_qr_generation(&self, user_id: &str) -> AppResult<User> {
        let mut user = self.get_user(user_id).await?;
        user.qr_generations_left = user.qr_generations_left.saturating_sub(1);
        user.updated_at = Utc::now();
        self.storage.update_user(&user).await?;
        Ok(user)
    }

    fn is_admin(&self, user: &User) -> bool {
        self.is_admin_telegram(user.telegram_id())
    }
}
