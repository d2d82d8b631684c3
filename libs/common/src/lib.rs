//! Common library for the blog API
//!
//! Connection-owning building blocks shared by the service: the Redis cache
//! and its population patterns, the supervised PostgreSQL provider, the SMTP
//! mailer and the admin alarm built on it, and the Google service-account
//! client.

pub mod alarm;
pub mod cache;
pub mod database;
pub mod error;
pub mod google;
pub mod mail;
pub mod state;

/// Example wiring of the shared components
///
/// ```rust,no_run
/// use std::time::Duration;
/// use common::alarm::Alarm;
/// use common::cache::{CacheService, RedisConfig, RedisStore};
/// use common::database::{DatabaseConfig, DatabaseProvider};
/// use common::mail::EmailService;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let alarm = Alarm::new(EmailService::disabled(), "Blog-API", "admin@example.com", "Redis Error!")
///         .throttled(Duration::from_secs(30));
///     let store = RedisStore::new(RedisConfig::default(), Some(alarm))?;
///     store.start();
///     let cache = CacheService::new(store);
///
///     let database = DatabaseProvider::connect(DatabaseConfig::from_env()?, None).await?;
///     database.start_monitor();
///     println!("cache: {}, database: {}", cache.state(), database.state());
///     Ok(())
/// }
/// ```
pub fn example_usage() {}
