//! Integration tests for the infrastructure components
//!
//! These tests need a running PostgreSQL and Redis (see `DATABASE_URL`,
//! `REDIS_HOST`, `REDIS_PORT`) and are ignored by default:
//! `cargo test -p common -- --ignored`.

use std::time::Duration;

use common::{
    cache::{CacheService, RedisConfig, RedisStore},
    database::{DatabaseConfig, DatabaseProvider, health_check},
    state::ConnectionState,
};
use sqlx::Row;

fn redis_config() -> RedisConfig {
    let mut config = RedisConfig::default();
    if let Ok(host) = std::env::var("REDIS_HOST") {
        config.host = host;
    }
    if let Some(port) = std::env::var("REDIS_PORT").ok().and_then(|p| p.parse().ok()) {
        config.port = port;
    }
    config
}

/// Test that verifies both PostgreSQL and Redis are accessible
/// and can perform basic operations
#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let database = DatabaseProvider::connect(DatabaseConfig::from_env()?, None).await?;
    assert_eq!(database.state(), ConnectionState::Ready);
    assert!(health_check(database.pool()).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result")
        .fetch_one(database.pool())
        .await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let store = RedisStore::new(redis_config(), None)?;
    store.start();
    let state = tokio::time::timeout(Duration::from_secs(30), store.tracker().settled()).await?;
    assert_eq!(state, ConnectionState::Ready);
    assert!(store.health_check().await?, "Redis health check failed");

    let cache = CacheService::new(store);
    let test_key = "integration_test_key";
    cache.set(test_key, "integration_test_value", Some(10)).await?;
    assert_eq!(
        cache.get::<String>(test_key).await?,
        Some("integration_test_value".to_string()),
        "Redis SET/GET test failed"
    );

    cache.delete(test_key).await?;
    assert_eq!(cache.get::<String>(test_key).await?, None, "Redis delete operation failed");

    Ok(())
}

/// A Redis that never answers ends in `Failed` once the retry budget is spent
#[tokio::test(start_paused = true)]
async fn test_unreachable_redis_gives_up() {
    let config = RedisConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        connection_timeout: Duration::from_millis(50),
        ..RedisConfig::default()
    };
    let store = RedisStore::new(config, None).unwrap();
    store.start();

    let state = store.tracker().settled().await;
    assert_eq!(state, ConnectionState::Failed);

    let cache = CacheService::new(store);
    assert!(cache.get::<String>("anything").await.is_err());
}
