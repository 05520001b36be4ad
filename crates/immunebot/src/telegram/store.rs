//! Per-user state and data stores
//!
//! Both stores report a never-written user as [`StoreError::Missing`] so callers
//! can tell "new user" apart from a broken backend.

use async_trait::async_trait;
use dashmap::DashMap;
use immunecore::cache::Cache;

use super::errors::StoreError;
use super::state::{ChatState, UserData};

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, user_id: &str) -> Result<ChatState, StoreError>;
    async fn set_state(&self, user_id: &str, state: ChatState) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get_data(&self, user_id: &str) -> Result<UserData, StoreError>;
    async fn set_data(&self, user_id: &str, data: &UserData) -> Result<(), StoreError>;
}

/// Stores kept in process memory, lost on restart
#[derive(Default)]
pub struct MemoryStore {
    states: DashMap<String, ChatState>,
    data: DashMap<String, UserData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_state(&self, user_id: &str) -> Result<ChatState, StoreError> {
        self.states.get(user_id).map(|s| *s).ok_or(StoreError::Missing)
    }

    async fn set_state(&self, user_id: &str, state: ChatState) -> Result<(), StoreError> {
        self.states.insert(user_id.to_string(), state);
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_data(&self, user_id: &str) -> Result<UserData, StoreError> {
        self.data.get(user_id).map(|d| d.clone()).ok_or(StoreError::Missing)
    }

    async fn set_data(&self, user_id: &str, data: &UserData) -> Result<(), StoreError> {
        self.data.insert(user_id.to_string(), data.clone());
        Ok(())
    }
}

/// Stores on top of the shared cache (redis in production), entries never expire
#[derive(Clone)]
pub struct CacheStore {
    cache: Cache,
}

impl CacheStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn state_key(user_id: &str) -> String {
        format!("bot_user_state:{user_id}")
    }

    fn data_key(user_id: &str) -> String {
        format!("bot_user_data:{user_id}")
    }
}

#[async_trait]
impl StateStore for CacheStore {
    async fn get_state(&self, user_id: &str) -> Result<ChatState, StoreError> {
        self.cache
            .get_json::<ChatState>(&Self::state_key(user_id))
            .await?
            .ok_or(StoreError::Missing)
    }

    async fn set_state(&self, user_id: &str, state: ChatState) -> Result<(), StoreError> {
        self.cache.set_json(&Self::state_key(user_id), &state, None).await?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for CacheStore {
    async fn get_data(&self, user_id: &str) -> Result<UserData, StoreError> {
        self.cache
            .get_json::<UserData>(&Self::data_key(user_id))
            .await?
            .ok_or(StoreError::Missing)
    }

    async fn set_data(&self, user_id: &str, data: &UserData) -> Result<(), StoreError> {
        self.cache.set_json(&Self::data_key(user_id), data, None).await?;
        Ok(())
    }
}
