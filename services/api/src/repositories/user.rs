//! User repository for database operations

use async_trait::async_trait;
use common::database::next_id;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

use super::RepositoryResult;
use crate::models::user::{NewUser, User, UserPatch};
use crate::models::{Page, PageRequest};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password, avatar, role, status, create_at, update_at";

/// Persistence used by the user service
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn exists_by_email(&self, email: &str) -> RepositoryResult<bool>;

    /// Whether `username` is taken by a user other than `except`
    async fn exists_by_username(&self, username: &str, except: Option<i64>)
    -> RepositoryResult<bool>;

    /// Insert a user whose password is already hashed
    async fn insert(&self, user: NewUser) -> RepositoryResult<User>;

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;

    async fn update(&self, id: i64, patch: UserPatch) -> RepositoryResult<Option<User>>;

    async fn list(&self, request: &PageRequest) -> RepositoryResult<Page<User>>;

    async fn count(&self) -> RepositoryResult<i64>;
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password: row.get("password"),
        avatar: row.get("avatar"),
        role: row.get::<String, _>("role").parse().unwrap_or_default(),
        status: row.get::<String, _>("status").parse().unwrap_or_default(),
        create_at: row.get("create_at"),
        update_at: row.get("update_at"),
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn exists_by_email(&self, email: &str) -> RepositoryResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS found")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("found"))
    }

    async fn exists_by_username(
        &self,
        username: &str,
        except: Option<i64>,
    ) -> RepositoryResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE username = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            ) AS found
            "#,
        )
        .bind(username)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("found"))
    }

    async fn insert(&self, user: NewUser) -> RepositoryResult<User> {
        info!("Creating new user: {}", user.username);
        let id = next_id(&self.pool, "user").await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, password, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(&row))
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn update(&self, id: i64, patch: UserPatch) -> RepositoryResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                avatar = COALESCE($5, avatar),
                status = COALESCE($6, status),
                role = COALESCE($7, role),
                update_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.username.as_deref())
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .bind(patch.avatar.as_deref())
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn list(&self, request: &PageRequest) -> RepositoryResult<Page<User>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(request.per_page)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        let total = self.count().await?;
        let users = rows.iter().map(user_from_row).collect();
        Ok(Page::new(users, total, request))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }
}
