//! User service: signup, profile reads and updates

use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use common::cache::CacheService;
use common::error::CacheError;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::user::{CreateUserRequest, NewUser, UpdateUserRequest, UserProfile};
use crate::models::{Page, PageQuery};
use crate::repositories::UserStore;
use crate::validation::Validate;

pub fn user_cache_key(id: i64) -> String {
    format!("user:{}", id)
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    cache: CacheService,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, cache: CacheService) -> Self {
        Self { store, cache }
    }

    /// Register a user. Email and username must both be free.
    pub async fn create_user(&self, request: CreateUserRequest) -> ApiResult<UserProfile> {
        let new_user = request.validate()?;

        if self.store.exists_by_email(&new_user.email).await? {
            return Err(ApiError::Conflict(format!(
                "User with email {} already exists",
                new_user.email
            )));
        }
        if self.store.exists_by_username(&new_user.username, None).await? {
            return Err(ApiError::Conflict(format!(
                "User with username {} already exists",
                new_user.username
            )));
        }

        let password = hash_password(&new_user.password)?;
        let user = self
            .store
            .insert(NewUser {
                password,
                ..new_user
            })
            .await?;
        info!("User {} registered", user.id);
        Ok(user.into())
    }

    /// Profile by id, served from `user:{id}` when cached
    pub async fn get_user(&self, id: i64) -> ApiResult<UserProfile> {
        let store = Arc::clone(&self.store);
        let cached = self
            .cache
            .promise(&user_cache_key(id), || async move {
                let user = store
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
                Ok::<_, anyhow::Error>(UserProfile::from(user))
            })
            .await;

        match cached {
            Ok(profile) => Ok(profile),
            Err(CacheError::Producer(e)) => Err(ApiError::from_producer(e)),
            Err(e) => {
                warn!("[User] cache unavailable, reading user {} directly: {}", id, e);
                self.store
                    .find_by_id(id)
                    .await?
                    .map(UserProfile::from)
                    .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))
            }
        }
    }

    /// Apply a profile update and drop the cached profile
    pub async fn update_user(&self, id: i64, request: UpdateUserRequest) -> ApiResult<UserProfile> {
        let patch = request.validate()?;

        if let Some(username) = patch.username.as_deref() {
            if self.store.exists_by_username(username, Some(id)).await? {
                return Err(ApiError::Conflict(format!(
                    "User with username {} already exists",
                    username
                )));
            }
        }

        let user = self
            .store
            .update(id, patch)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;

        if let Err(e) = self.cache.delete(&user_cache_key(id)).await {
            warn!("[User] failed to invalidate cache for user {}: {}", id, e);
        }
        Ok(user.into())
    }

    pub async fn list_users(&self, query: PageQuery) -> ApiResult<Page<UserProfile>> {
        let request = query.validate()?;
        let page = self.store.list(&request).await?;
        Ok(page.map(UserProfile::from))
    }

    pub async fn count(&self) -> ApiResult<i64> {
        Ok(self.store.count().await?)
    }
}
