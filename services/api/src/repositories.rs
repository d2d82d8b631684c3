//! Repositories for database operations
//!
//! Each entity has a store trait used by its service and a PostgreSQL
//! implementation. Identifiers come from the per-model counter table.

use common::error::DatabaseError;
use thiserror::Error;

pub mod tag;
pub mod user;

pub use tag::{TagRepository, TagStore};
pub use user::{UserRepository, UserStore};

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                let field = match db.constraint() {
                    Some(constraint) => constraint_field(constraint),
                    None => "value".to_string(),
                };
                return RepositoryError::Duplicate(field);
            }
        }
        RepositoryError::Database(DatabaseError::Query(e))
    }
}

/// `users_email_key` → `email`
fn constraint_field(constraint: &str) -> String {
    let trimmed = constraint.strip_suffix("_key").unwrap_or(constraint);
    match trimmed.split_once('_') {
        Some((_, field)) => field.to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_map_to_fields() {
        assert_eq!(constraint_field("users_email_key"), "email");
        assert_eq!(constraint_field("tags_slug_key"), "slug");
        assert_eq!(constraint_field("unique"), "unique");
    }
}
