//! Cache service
//!
//! Wraps a [`CacheStore`] with JSON (de)serialization, a readiness check on
//! every command, and two population patterns:
//!
//! - `promise`: passive. Serve the cached value, or run the producer, store
//!   its result and serve that. `promise_io` hands back a [`PromiseIo`] so
//!   the caller decides when to read and when to force a refresh.
//! - `interval`: active. A detached background loop keeps running the
//!   producer, either on a fixed cadence ([`TimeoutOptions`]) or on a cron
//!   schedule ([`TimingOptions`]), and the caller reads the latest value
//!   through an [`IntervalGetter`] or [`IntervalIo`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use common::cache::{CacheService, IntervalOptions, MemoryStore, TimeoutOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheService::new(Arc::new(MemoryStore::new()));
//! let hits: u64 = cache.promise("hits", || async { Ok(42) }).await?;
//!
//! let uptime = cache
//!     .interval(
//!         "uptime",
//!         || async { Ok(1u64) },
//!         IntervalOptions::Timeout(TimeoutOptions::every(Duration::from_secs(60))),
//!     )
//!     .await?;
//! let latest: Option<u64> = uptime.get().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, warn};

use super::CacheStore;
use crate::error::{CacheError, CacheResult};
use crate::state::ConnectionState;

type ProducerFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;
type Producer<T> = Arc<dyn Fn() -> ProducerFuture<T> + Send + Sync>;

/// Values that can live in the cache and move between tasks
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Fixed-cadence population: wait `success` after a good run, `error`
/// (or `success` when unset) after a failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutOptions {
    pub success: Duration,
    pub error: Option<Duration>,
}

impl TimeoutOptions {
    pub fn every(success: Duration) -> Self {
        Self {
            success,
            error: None,
        }
    }

    pub fn retry_after(mut self, error: Duration) -> Self {
        self.error = Some(error);
        self
    }

    fn error_delay(&self) -> Duration {
        self.error.unwrap_or(self.success)
    }
}

/// Cron population: run on every fire of `schedule` (six fields, seconds
/// first); a failed run is retried after `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingOptions {
    pub schedule: String,
    pub error: Duration,
}

impl TimingOptions {
    pub fn new(schedule: impl Into<String>, error: Duration) -> Self {
        Self {
            schedule: schedule.into(),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalOptions {
    Timeout(TimeoutOptions),
    Timing(TimingOptions),
}

/// JSON cache over a [`CacheStore`]
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    scheduler: Arc<OnceCell<JobScheduler>>,
}

impl fmt::Debug for CacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("state", &self.state())
            .finish()
    }
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            scheduler: Arc::new(OnceCell::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.store.state()
    }

    fn ensure_ready(&self) -> CacheResult<()> {
        let state = self.store.state();
        if state.is_ready() {
            Ok(())
        } else {
            Err(CacheError::NotReady(state))
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.ensure_ready()?;
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store `value`, expiring after `ttl_seconds` when given
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> CacheResult<()> {
        self.ensure_ready()?;
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw, ttl_seconds).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.ensure_ready()?;
        self.store.delete(key).await
    }

    /// Cached value for `key`, populated by `producer` on a miss
    pub async fn promise<T, F, Fut>(&self, key: &str, producer: F) -> CacheResult<T>
    where
        T: CacheValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(value) = self.get::<T>(key).await? {
            return Ok(value);
        }
        debug!("[Cache] miss for {}, running producer", key);
        let value = producer().await.map_err(CacheError::Producer)?;
        self.set(key, &value, None).await?;
        Ok(value)
    }

    /// IO mode of [`CacheService::promise`]; nothing runs until the handle is used
    pub fn promise_io<T, F, Fut>(&self, key: impl Into<String>, producer: F) -> PromiseIo<T>
    where
        T: CacheValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        PromiseIo {
            task: Task::new(self.clone(), key.into(), producer),
        }
    }

    /// Start active population of `key` and return its getter
    pub async fn interval<T, F, Fut>(
        &self,
        key: impl Into<String>,
        producer: F,
        options: IntervalOptions,
    ) -> CacheResult<IntervalGetter<T>>
    where
        T: CacheValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let task = Task::new(self.clone(), key.into(), producer);
        self.spawn_interval(task.clone(), options).await?;
        Ok(IntervalGetter { task })
    }

    /// IO mode of [`CacheService::interval`]
    pub async fn interval_io<T, F, Fut>(
        &self,
        key: impl Into<String>,
        producer: F,
        options: IntervalOptions,
    ) -> CacheResult<IntervalIo<T>>
    where
        T: CacheValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let task = Task::new(self.clone(), key.into(), producer);
        self.spawn_interval(task.clone(), options).await?;
        Ok(IntervalIo { task })
    }

    async fn spawn_interval<T: CacheValue>(
        &self,
        task: Task<T>,
        options: IntervalOptions,
    ) -> CacheResult<()> {
        match options {
            IntervalOptions::Timeout(timeout) => {
                tokio::spawn(run_timeout_loop(task, timeout));
            }
            IntervalOptions::Timing(timing) => {
                let retry = timing.error;
                let job_task = task.clone();
                let job = Job::new_async(timing.schedule.as_str(), move |_, _| {
                    let task = job_task.clone();
                    Box::pin(async move {
                        tokio::spawn(run_until_success(task, retry));
                    })
                })
                .map_err(schedule_error)?;

                self.scheduler().await?.add(job).await.map_err(schedule_error)?;
                tokio::spawn(run_until_success(task, retry));
            }
        }
        Ok(())
    }

    async fn scheduler(&self) -> CacheResult<&JobScheduler> {
        self.scheduler
            .get_or_try_init(|| async {
                let scheduler = JobScheduler::new().await.map_err(schedule_error)?;
                scheduler.start().await.map_err(schedule_error)?;
                Ok(scheduler)
            })
            .await
    }
}

fn schedule_error(e: JobSchedulerError) -> CacheError {
    CacheError::Schedule(e.to_string())
}

async fn run_timeout_loop<T: CacheValue>(task: Task<T>, timeout: TimeoutOptions) {
    loop {
        let delay = match task.run().await {
            Ok(_) => timeout.success,
            Err(e) => {
                let delay = timeout.error_delay();
                warn!(
                    "[Redis] Timeout task execution failed, {}s retry later: {}",
                    delay.as_secs_f64(),
                    e
                );
                delay
            }
        };
        tokio::time::sleep(delay).await;
    }
}

async fn run_until_success<T: CacheValue>(task: Task<T>, retry: Duration) {
    while let Err(e) = task.run().await {
        warn!(
            "[Redis] The execution of the scheduled task failed, {}s retry later: {}",
            retry.as_secs_f64(),
            e
        );
        tokio::time::sleep(retry).await;
    }
}

/// A key bound to its producer
struct Task<T> {
    cache: CacheService,
    key: Arc<str>,
    producer: Producer<T>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: Arc::clone(&self.key),
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T: CacheValue> Task<T> {
    fn new<F, Fut>(cache: CacheService, key: String, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let producer: Producer<T> = Arc::new(move || Box::pin(producer()) as ProducerFuture<T>);
        Self {
            cache,
            key: key.into(),
            producer,
        }
    }

    /// Run the producer and store its result
    async fn run(&self) -> CacheResult<T> {
        let value = (self.producer)().await.map_err(CacheError::Producer)?;
        self.cache.set(&self.key, &value, None).await?;
        Ok(value)
    }

    async fn cached(&self) -> CacheResult<Option<T>> {
        self.cache.get(&self.key).await
    }

    async fn cached_or_run(&self) -> CacheResult<T> {
        match self.cached().await? {
            Some(value) => Ok(value),
            None => self.run().await,
        }
    }
}

/// Getter/updater pair returned by [`CacheService::promise_io`]
#[derive(Clone)]
pub struct PromiseIo<T> {
    task: Task<T>,
}

impl<T: CacheValue> PromiseIo<T> {
    pub fn key(&self) -> &str {
        &self.task.key
    }

    /// Cached value, populated on a miss
    pub async fn get(&self) -> CacheResult<T> {
        self.task.cached_or_run().await
    }

    /// Run the producer unconditionally and store the result
    pub async fn update(&self) -> CacheResult<T> {
        self.task.run().await
    }
}

/// Getter returned by [`CacheService::interval`]
#[derive(Clone)]
pub struct IntervalGetter<T> {
    task: Task<T>,
}

impl<T: CacheValue> IntervalGetter<T> {
    pub fn key(&self) -> &str {
        &self.task.key
    }

    /// Latest value stored by the background loop
    pub async fn get(&self) -> CacheResult<Option<T>> {
        self.task.cached().await
    }
}

/// Getter/updater pair returned by [`CacheService::interval_io`]
#[derive(Clone)]
pub struct IntervalIo<T> {
    task: Task<T>,
}

impl<T: CacheValue> IntervalIo<T> {
    pub fn key(&self) -> &str {
        &self.task.key
    }

    pub async fn get(&self) -> CacheResult<Option<T>> {
        self.task.cached().await
    }

    pub async fn update(&self) -> CacheResult<T> {
        self.task.run().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::cache::MemoryStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        tags: u64,
        users: u64,
    }

    fn ready_cache() -> CacheService {
        CacheService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn get_fails_fast_when_not_ready() {
        let cache = CacheService::new(Arc::new(MemoryStore::disconnected()));
        let result = tokio::time::timeout(Duration::from_millis(50), cache.get::<u64>("missing"))
            .await
            .expect("get must not block");
        assert!(matches!(
            result,
            Err(CacheError::NotReady(ConnectionState::Disconnected))
        ));
        assert_err!(cache.set("key", &1u64, None).await);
        assert_err!(cache.delete("key").await);
    }

    #[tokio::test]
    async fn set_then_get_returns_structured_value() {
        let cache = ready_cache();
        let snapshot = Snapshot { tags: 3, users: 9 };
        assert_ok!(cache.set("statistic", &snapshot, Some(60)).await);
        assert_eq!(cache.get::<Snapshot>("statistic").await.unwrap(), Some(snapshot));

        assert_ok!(cache.delete("statistic").await);
        assert_eq!(cache.get::<Snapshot>("statistic").await.unwrap(), None);
    }

    #[tokio::test]
    async fn promise_runs_producer_once() {
        let cache = ready_cache();
        let calls = AtomicUsize::new(0);

        let produce = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7u64)
        };
        assert_eq!(cache.promise("seven", produce).await.unwrap(), 7);

        let produce = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(8u64)
        };
        assert_eq!(cache.promise("seven", produce).await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn promise_rejects_without_running_producer_when_not_ready() {
        let cache = CacheService::new(Arc::new(MemoryStore::disconnected()));
        let calls = AtomicUsize::new(0);
        let result = cache
            .promise("key", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1u64)
            })
            .await;
        assert!(matches!(result, Err(CacheError::NotReady(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn promise_surfaces_producer_errors_and_stores_nothing() {
        let cache = ready_cache();
        let result = cache
            .promise("broken", || async { Err::<u64, _>(anyhow::anyhow!("db down")) })
            .await;
        assert!(matches!(result, Err(CacheError::Producer(_))));
        assert_eq!(cache.get::<u64>("broken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn promise_io_update_always_refreshes() {
        let cache = ready_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let io = cache.promise_io("counter", move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) as u64) }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(io.get().await.unwrap(), 0);
        assert_eq!(io.get().await.unwrap(), 0);
        assert_eq!(io.update().await.unwrap(), 1);
        assert_eq!(io.get().await.unwrap(), 1);
        assert_eq!(io.key(), "counter");
    }

    #[tokio::test(start_paused = true)]
    async fn interval_timeout_repeats_on_success_cadence() {
        let cache = ready_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let getter = cache
            .interval(
                "ticks",
                move || {
                    let counter = Arc::clone(&counter);
                    async move { Ok(counter.fetch_add(1, Ordering::SeqCst) as u64) }
                },
                IntervalOptions::Timeout(TimeoutOptions::every(Duration::from_secs(1))),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(getter.get().await.unwrap(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_timeout_uses_error_delay_after_failure() {
        let cache = ready_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let getter = cache
            .interval(
                "flaky",
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        let call = counter.fetch_add(1, Ordering::SeqCst);
                        if call < 2 {
                            anyhow::bail!("attempt {} failed", call);
                        }
                        Ok(call as u64)
                    }
                },
                IntervalOptions::Timeout(
                    TimeoutOptions::every(Duration::from_secs(10))
                        .retry_after(Duration::from_millis(100)),
                ),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(getter.get().await.unwrap(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interval_timing_refreshes_on_each_cron_fire() {
        let cache = ready_cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let io = cache
            .interval_io(
                "cron",
                move || {
                    let counter = Arc::clone(&counter);
                    async move { Ok(counter.fetch_add(1, Ordering::SeqCst) as u64) }
                },
                IntervalOptions::Timing(TimingOptions::new(
                    "* * * * * *",
                    Duration::from_millis(100),
                )),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert!(io.get().await.unwrap().unwrap_or_default() >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interval_timing_retries_failures_no_sooner_than_error_delay() {
        let cache = ready_cache();
        let attempts = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let recorder = Arc::clone(&attempts);
        let retry = Duration::from_millis(100);

        let getter = cache
            .interval(
                "never",
                move || {
                    let recorder = Arc::clone(&recorder);
                    async move {
                        recorder.lock().unwrap().push(Instant::now());
                        Err::<u64, _>(anyhow::anyhow!("upstream unavailable"))
                    }
                },
                IntervalOptions::Timing(TimingOptions::new("0 0 0 1 1 *", retry)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;

        let attempts = attempts.lock().unwrap().clone();
        assert!(attempts.len() >= 3, "expected retries, got {}", attempts.len());
        for pair in attempts.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= retry);
        }
        assert_eq!(getter.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn interval_rejects_invalid_schedule() {
        let cache = ready_cache();
        let result = cache
            .interval(
                "bad",
                || async { Ok(1u64) },
                IntervalOptions::Timing(TimingOptions::new(
                    "not a cron line",
                    Duration::from_secs(1),
                )),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Schedule(_))));
    }
}
