//! Custom error types for the common library
//!
//! Every connection-owning component gets its own error enum so callers can
//! tell a not-ready cache apart from a failed query or an unreachable relay.

use sqlx::Error as SqlxError;
use thiserror::Error;

use crate::state::ConnectionState;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised by the cache wrapper and its stores
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store connection has not completed its handshake
    #[error("Redis has not ready! (state: {0})")]
    NotReady(ConnectionState),

    /// The remote store rejected a command
    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A value could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The producer of a cached value failed
    #[error("Cache producer failed: {0}")]
    Producer(anyhow::Error),

    /// A cron expression or scheduler could not be set up
    #[error("Cache schedule error: {0}")]
    Schedule(String),

    /// Invalid store configuration
    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with CacheError
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the SMTP mailer
#[derive(Error, Debug)]
pub enum MailError {
    /// Transport could not be built or the relay refused the connection
    #[error("Mail transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// A mailbox address failed to parse
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message could not be assembled
    #[error("Invalid mail message: {0}")]
    Message(#[from] lettre::error::Error),
}

/// Errors raised by the Google service-account client
#[derive(Error, Debug)]
pub enum GoogleError {
    /// The service account file was missing or malformed at start-up
    #[error("[GoogleAPI] Failed to initialize successfully, unable to get certificate")]
    NotInitialized,

    /// The assertion could not be signed
    #[error("[GoogleAPI] Failed to sign assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// The token endpoint could not be reached or answered with an error
    #[error("[GoogleAPI] Token request failed: {0}")]
    Http(#[from] reqwest::Error),
}
