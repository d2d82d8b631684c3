//! Shared fixtures for the router tests: in-memory stores and a ready state.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use api::config::{RuntimeEnvironment, Settings};
use api::models::tag::{NewTag, Tag};
use api::models::user::{NewUser, User, UserPatch};
use api::models::{Page, PageRequest};
use api::repositories::{RepositoryResult, TagStore, UserStore};
use api::routes::create_router;
use api::services::{ExpansionService, TagService, UserService};
use api::state::AppState;
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use chrono::Utc;
use common::cache::{CacheService, MemoryStore};
use common::google::GoogleService;
use common::state::{ConnectionState, ConnectionTracker};
use serde_json::Value;

fn page_of<T: Clone>(items: &[T], request: &PageRequest) -> Page<T> {
    let documents = items
        .iter()
        .skip(request.offset() as usize)
        .take(request.per_page as usize)
        .cloned()
        .collect();
    Page::new(documents, items.len() as i64, request)
}

/// User store over a vector. `calls` counts every access except `count`,
/// which the statistic interval polls in the background.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    pub calls: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryUserStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn touch(&self) -> std::sync::MutexGuard<'_, Vec<User>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.users.lock().unwrap()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn exists_by_email(&self, email: &str) -> RepositoryResult<bool> {
        Ok(self.touch().iter().any(|u| u.email == email))
    }

    async fn exists_by_username(&self, username: &str, except: Option<i64>) -> RepositoryResult<bool> {
        Ok(self
            .touch()
            .iter()
            .any(|u| u.username == username && Some(u.id) != except))
    }

    async fn insert(&self, user: NewUser) -> RepositoryResult<User> {
        let mut users = self.touch();
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let user = User {
            id: users.len() as i64 + 1,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password: user.password,
            avatar: String::new(),
            role: user.role,
            status: user.status,
            create_at: now,
            update_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        Ok(self.touch().iter().find(|u| u.id == id).cloned())
    }

    async fn update(&self, id: i64, patch: UserPatch) -> RepositoryResult<Option<User>> {
        let mut users = self.touch();
        self.writes.fetch_add(1, Ordering::SeqCst);
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        if let Some(avatar) = patch.avatar {
            user.avatar = avatar;
        }
        if let Some(status) = patch.status {
            user.status = status;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        user.update_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn list(&self, request: &PageRequest) -> RepositoryResult<Page<User>> {
        Ok(page_of(&self.touch(), request))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.users.lock().unwrap().len() as i64)
    }
}

/// Tag store over a vector, counting accesses like [`MemoryUserStore`]
#[derive(Default)]
pub struct MemoryTagStore {
    tags: Mutex<Vec<Tag>>,
    next_id: AtomicUsize,
    pub calls: AtomicUsize,
    pub all_calls: AtomicUsize,
}

impl MemoryTagStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn all_calls(&self) -> usize {
        self.all_calls.load(Ordering::SeqCst)
    }

    fn touch(&self) -> std::sync::MutexGuard<'_, Vec<Tag>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tags.lock().unwrap()
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn exists_by_slug(&self, slug: &str, except: Option<i64>) -> RepositoryResult<bool> {
        Ok(self
            .touch()
            .iter()
            .any(|t| t.slug == slug && Some(t.id) != except))
    }

    async fn insert(&self, tag: NewTag) -> RepositoryResult<Tag> {
        let mut tags = self.touch();
        let now = Utc::now();
        let tag = Tag {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1,
            name: tag.name,
            slug: tag.slug,
            description: tag.description,
            extends: tag.extends,
            create_at: now,
            update_at: now,
        };
        tags.push(tag.clone());
        Ok(tag)
    }

    async fn find_by_slug(&self, slug: &str) -> RepositoryResult<Option<Tag>> {
        Ok(self.touch().iter().find(|t| t.slug == slug).cloned())
    }

    async fn update(&self, id: i64, tag: NewTag) -> RepositoryResult<Option<Tag>> {
        let mut tags = self.touch();
        let Some(existing) = tags.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        existing.name = tag.name;
        existing.slug = tag.slug;
        existing.description = tag.description;
        existing.extends = tag.extends;
        existing.update_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, id: i64) -> RepositoryResult<bool> {
        let mut tags = self.touch();
        let before = tags.len();
        tags.retain(|t| t.id != id);
        Ok(tags.len() < before)
    }

    async fn delete_many(&self, ids: &[i64]) -> RepositoryResult<u64> {
        let mut tags = self.touch();
        let before = tags.len();
        tags.retain(|t| !ids.contains(&t.id));
        Ok((before - tags.len()) as u64)
    }

    async fn list(&self, request: &PageRequest) -> RepositoryResult<Page<Tag>> {
        let tags = self.touch();
        let matching: Vec<Tag> = match request.keyword.as_deref() {
            Some(keyword) => tags
                .iter()
                .filter(|t| t.name.contains(keyword) || t.slug.contains(keyword))
                .cloned()
                .collect(),
            None => tags.clone(),
        };
        Ok(page_of(&matching, request))
    }

    async fn all(&self) -> RepositoryResult<Vec<Tag>> {
        self.all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.touch().clone())
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.tags.lock().unwrap().len() as i64)
    }
}

pub struct TestApp {
    pub router: Router,
    pub users: Arc<MemoryUserStore>,
    pub tags: Arc<MemoryTagStore>,
    pub cache: CacheService,
}

/// Router over in-memory stores and a ready in-memory cache
pub async fn test_app() -> TestApp {
    let settings = Settings::defaults(RuntimeEnvironment::Test).unwrap();
    let cache = CacheService::new(Arc::new(MemoryStore::new()));
    let users = Arc::new(MemoryUserStore::default());
    let tags = Arc::new(MemoryTagStore::default());

    let user_store: Arc<dyn UserStore> = users.clone();
    let tag_store: Arc<dyn TagStore> = tags.clone();

    let expansion = ExpansionService::start(
        &cache,
        Arc::clone(&user_store),
        Arc::clone(&tag_store),
        GoogleService::uninitialized(),
    )
    .await
    .unwrap();

    let database = ConnectionTracker::new("Postgres");
    database.transition(ConnectionState::Ready);

    let state = AppState {
        settings: Arc::new(settings),
        cache: cache.clone(),
        database,
        users: UserService::new(user_store, cache.clone()),
        tags: TagService::new(tag_store, cache.clone()),
        expansion,
    };

    TestApp {
        router: create_router(state),
        users,
        tags,
        cache,
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
