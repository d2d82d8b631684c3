//! Tag service
//!
//! The full tag list lives in the cache under [`ALL_TAGS_CACHE_KEY`]; every
//! mutation refreshes it and drops the `/tag/all` route cache entry.

use std::sync::Arc;

use common::cache::{CacheService, PromiseIo};
use common::error::CacheError;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::models::tag::{DeleteTagsRequest, Tag, TagRequest};
use crate::models::{Page, PageQuery};
use crate::repositories::TagStore;
use crate::validation::Validate;

pub const ALL_TAGS_CACHE_KEY: &str = "tags:all";
pub const ALL_TAGS_ROUTE_CACHE_KEY: &str = "tag:all";

#[derive(Clone)]
pub struct TagService {
    store: Arc<dyn TagStore>,
    cache: CacheService,
    all: PromiseIo<Vec<Tag>>,
}

impl TagService {
    pub fn new(store: Arc<dyn TagStore>, cache: CacheService) -> Self {
        let producer_store = Arc::clone(&store);
        let all = cache.promise_io(ALL_TAGS_CACHE_KEY, move || {
            let store = Arc::clone(&producer_store);
            async move { Ok::<_, anyhow::Error>(store.all().await?) }
        });
        Self { store, cache, all }
    }

    pub async fn list_tags(&self, query: PageQuery) -> ApiResult<Page<Tag>> {
        let request = query.validate()?;
        Ok(self.store.list(&request).await?)
    }

    /// Every tag, served from the cache when possible
    pub async fn all_tags(&self) -> ApiResult<Vec<Tag>> {
        match self.all.get().await {
            Ok(tags) => Ok(tags),
            Err(CacheError::Producer(e)) => Err(ApiError::from_producer(e)),
            Err(e) => {
                warn!("[Tag] cache unavailable, reading tags directly: {}", e);
                Ok(self.store.all().await?)
            }
        }
    }

    pub async fn get_tag_by_slug(&self, slug: &str) -> ApiResult<Tag> {
        self.store
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Tag {} not found", slug)))
    }

    pub async fn create_tag(&self, request: TagRequest) -> ApiResult<Tag> {
        let tag = request.validate()?;
        if self.store.exists_by_slug(&tag.slug, None).await? {
            return Err(ApiError::Conflict(format!("Tag slug {} already exists", tag.slug)));
        }
        let tag = self.store.insert(tag).await?;
        self.refresh().await;
        Ok(tag)
    }

    pub async fn update_tag(&self, id: i64, request: TagRequest) -> ApiResult<Tag> {
        let tag = request.validate()?;
        if self.store.exists_by_slug(&tag.slug, Some(id)).await? {
            return Err(ApiError::Conflict(format!("Tag slug {} already exists", tag.slug)));
        }
        let tag = self
            .store
            .update(id, tag)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Tag {} not found", id)))?;
        self.refresh().await;
        Ok(tag)
    }

    pub async fn delete_tag(&self, id: i64) -> ApiResult<()> {
        if !self.store.delete(id).await? {
            return Err(ApiError::NotFound(format!("Tag {} not found", id)));
        }
        self.refresh().await;
        Ok(())
    }

    /// Delete a batch of tags, returning how many were removed
    pub async fn delete_tags(&self, request: DeleteTagsRequest) -> ApiResult<u64> {
        let ids = request.validate()?;
        let deleted = self.store.delete_many(&ids).await?;
        self.refresh().await;
        Ok(deleted)
    }

    pub async fn count(&self) -> ApiResult<i64> {
        Ok(self.store.count().await?)
    }

    async fn refresh(&self) {
        if let Err(e) = self.all.update().await {
            warn!("[Tag] failed to refresh {}: {}", ALL_TAGS_CACHE_KEY, e);
        }
        if let Err(e) = self.cache.delete(ALL_TAGS_ROUTE_CACHE_KEY).await {
            warn!("[Tag] failed to drop {}: {}", ALL_TAGS_ROUTE_CACHE_KEY, e);
        }
    }
}
