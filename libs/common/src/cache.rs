//! Redis cache module
//!
//! [`RedisStore`] owns the Redis client and supervises its connection:
//! connection state is published through a [`ConnectionTracker`], failed
//! connects are retried following a [`RetryPolicy`], and every connection
//! error raises a (throttled) alarm. Commands never wait for a connection;
//! they fail with [`CacheError::NotReady`] unless the state is `Ready`.
//!
//! [`CacheService`] sits on top of any [`CacheStore`] and adds JSON values
//! plus the `promise` and `interval` population patterns.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};
use url::Url;

use crate::alarm::Alarm;
use crate::error::{CacheError, CacheResult};
use crate::state::{ConnectionState, ConnectionTracker};

pub mod memory;
pub mod service;

pub use memory::MemoryStore;
pub use service::{
    CacheService, IntervalGetter, IntervalIo, IntervalOptions, PromiseIo, TimeoutOptions,
    TimingOptions,
};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Timeout for a single connect attempt
    pub connection_timeout: Duration,
    /// Timeout for a single command
    pub response_timeout: Duration,
    pub retry: RetryPolicy,
}

impl RedisConfig {
    /// Connection URL with credentials percent-encoded
    pub fn url(&self) -> CacheResult<String> {
        let mut url = Url::parse(&format!("redis://{}:{}", self.host, self.port))
            .map_err(|e| CacheError::Configuration(format!("invalid redis address: {}", e)))?;
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(username)
                .map_err(|_| CacheError::Configuration("invalid redis username".to_string()))?;
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| CacheError::Configuration("invalid redis password".to_string()))?;
        }
        Ok(url.to_string())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            connection_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Linear backoff with a ceiling and a bounded number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub step: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            max_retries: 6,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `retries` (1-based), `None` once the budget is spent
    pub fn delay_for(&self, retries: u32) -> Option<Duration> {
        if retries > self.max_retries {
            return None;
        }
        Some((self.step * retries).min(self.max_delay))
    }
}

/// Raw key-value access used by [`CacheService`]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Current connection state; commands only succeed when `Ready`
    fn state(&self) -> ConnectionState;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// Reconnect requests tagged with the connection generation they failed on.
/// Requests from an older generation never drop a newer connection.
#[derive(Default)]
struct ReconnectSignal {
    notify: Notify,
    failed_generation: AtomicU64,
}

impl ReconnectSignal {
    fn request(&self, generation: u64) {
        self.failed_generation.fetch_max(generation, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Wait until a command on `generation` reports a dropped connection
    async fn wait(&self, generation: u64) {
        while self.failed_generation.load(Ordering::SeqCst) < generation {
            self.notify.notified().await;
        }
    }
}

/// Supervised Redis connection
pub struct RedisStore {
    client: Client,
    config: RedisConfig,
    connection: RwLock<Option<(MultiplexedConnection, u64)>>,
    generation: AtomicU64,
    tracker: ConnectionTracker,
    reconnect: ReconnectSignal,
    alarm: Option<Alarm>,
}

impl RedisStore {
    /// Create the client. No connection is made until [`RedisStore::start`].
    pub fn new(config: RedisConfig, alarm: Option<Alarm>) -> CacheResult<Arc<Self>> {
        let client = Client::open(config.url()?)?;
        info!("Redis client initialized for {}:{}", config.host, config.port);
        Ok(Arc::new(Self {
            client,
            config,
            connection: RwLock::new(None),
            generation: AtomicU64::new(0),
            tracker: ConnectionTracker::new("Redis"),
            reconnect: ReconnectSignal::default(),
            alarm,
        }))
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Spawn the connection supervisor
    pub fn start(self: &Arc<Self>) {
        let store = Arc::clone(self);
        tokio::spawn(async move { store.supervise().await });
    }

    async fn supervise(self: Arc<Self>) {
        let mut retries: u32 = 0;
        self.tracker.transition(ConnectionState::Connecting);
        info!("[Redis] connecting...");

        loop {
            let attempt = self
                .client
                .get_multiplexed_async_connection_with_timeouts(
                    self.config.response_timeout,
                    self.config.connection_timeout,
                )
                .await;

            match attempt {
                Ok(connection) => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    *self.connection.write().await = Some((connection, generation));
                    retries = 0;
                    self.tracker.transition(ConnectionState::Ready);
                    info!("[Redis] readied!");

                    self.reconnect.wait(generation).await;

                    *self.connection.write().await = None;
                    self.tracker.transition(ConnectionState::Reconnecting);
                    warn!("[Redis] reconnecting...");
                }
                Err(e) => {
                    retries += 1;
                    let message = format!("[Redis] retryStrategy! retries: {}, error: {}", retries, e);
                    error!("{}", message);
                    if let Some(alarm) = &self.alarm {
                        alarm.raise(&message);
                    }

                    match self.config.retry.delay_for(retries) {
                        Some(delay) => {
                            if self.tracker.current() != ConnectionState::Connecting {
                                self.tracker.transition(ConnectionState::Reconnecting);
                            }
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.tracker.transition(ConnectionState::Failed);
                            let fatal = "[Redis] The number of attempts has reached the limit!";
                            error!("{}", fatal);
                            if let Some(alarm) = &self.alarm {
                                alarm.with_subject("Redis Fatal!").raise(fatal);
                            }
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn connection(&self) -> CacheResult<(MultiplexedConnection, u64)> {
        let state = self.tracker.current();
        if !state.is_ready() {
            return Err(CacheError::NotReady(state));
        }
        self.connection
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotReady(state))
    }

    /// Log a failed command; dropped connections raise the alarm and are
    /// handed to the supervisor
    fn command_failed(&self, e: RedisError, generation: u64) -> CacheError {
        let message = format!("[Redis] Client Error! {}", e);
        error!("{}", message);
        if e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() {
            if let Some(alarm) = &self.alarm {
                alarm.raise(&message);
            }
            self.reconnect.request(generation);
        }
        CacheError::Redis(e)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let (mut conn, generation) = self.connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.command_failed(e, generation))?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn state(&self) -> ConnectionState {
        self.tracker.current()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let (mut conn, generation) = self.connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(|e| self.command_failed(e, generation))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let (mut conn, generation) = self.connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn
                .set_ex(key, value, ttl)
                .await
                .map_err(|e| self.command_failed(e, generation))?;
        } else {
            let _: () = conn
                .set(key, value)
                .await
                .map_err(|e| self.command_failed(e, generation))?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let (mut conn, generation) = self.connection().await?;
        let _: u64 = conn.del(key).await.map_err(|e| self.command_failed(e, generation))?;
        Ok(())
    }
}
