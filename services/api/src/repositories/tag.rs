//! Tag repository for database operations

use async_trait::async_trait;
use common::database::next_id;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::RepositoryResult;
use crate::models::tag::{Extend, NewTag, Tag};
use crate::models::{Page, PageRequest};

const TAG_COLUMNS: &str = "id, name, slug, description, extends, create_at, update_at";

/// Persistence used by the tag service
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Whether `slug` is taken by a tag other than `except`
    async fn exists_by_slug(&self, slug: &str, except: Option<i64>) -> RepositoryResult<bool>;

    async fn insert(&self, tag: NewTag) -> RepositoryResult<Tag>;

    async fn find_by_slug(&self, slug: &str) -> RepositoryResult<Option<Tag>>;

    async fn update(&self, id: i64, tag: NewTag) -> RepositoryResult<Option<Tag>>;

    async fn delete(&self, id: i64) -> RepositoryResult<bool>;

    /// Delete every listed tag, returning how many existed
    async fn delete_many(&self, ids: &[i64]) -> RepositoryResult<u64>;

    async fn list(&self, request: &PageRequest) -> RepositoryResult<Page<Tag>>;

    async fn all(&self) -> RepositoryResult<Vec<Tag>>;

    async fn count(&self) -> RepositoryResult<i64>;
}

/// Tag repository
#[derive(Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    /// Create a new tag repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tag_from_row(row: &PgRow) -> Tag {
    let Json(extends): Json<Vec<Extend>> = row.get("extends");
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        extends,
        create_at: row.get("create_at"),
        update_at: row.get("update_at"),
    }
}

fn keyword_pattern(keyword: Option<&str>) -> Option<String> {
    keyword.map(|k| {
        let escaped = k
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{}%", escaped)
    })
}

#[async_trait]
impl TagStore for TagRepository {
    async fn exists_by_slug(&self, slug: &str, except: Option<i64>) -> RepositoryResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tags
                WHERE slug = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            ) AS found
            "#,
        )
        .bind(slug)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("found"))
    }

    async fn insert(&self, tag: NewTag) -> RepositoryResult<Tag> {
        let id = next_id(&self.pool, "tag").await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tags (id, name, slug, description, extends)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TAG_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(tag.description.as_deref())
        .bind(Json(&tag.extends))
        .fetch_one(&self.pool)
        .await?;
        Ok(tag_from_row(&row))
    }

    async fn find_by_slug(&self, slug: &str) -> RepositoryResult<Option<Tag>> {
        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(tag_from_row))
    }

    async fn update(&self, id: i64, tag: NewTag) -> RepositoryResult<Option<Tag>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tags SET
                name = $2,
                slug = $3,
                description = $4,
                extends = $5,
                update_at = NOW()
            WHERE id = $1
            RETURNING {TAG_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&tag.name)
        .bind(&tag.slug)
        .bind(tag.description.as_deref())
        .bind(Json(&tag.extends))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(tag_from_row))
    }

    async fn delete(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[i64]) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, request: &PageRequest) -> RepositoryResult<Page<Tag>> {
        let pattern = keyword_pattern(request.keyword.as_deref());
        let filter = "($1::TEXT IS NULL OR name ILIKE $1 OR slug ILIKE $1 OR description ILIKE $1)";

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TAG_COLUMNS}
            FROM tags
            WHERE {filter}
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(pattern.as_deref())
        .bind(request.per_page)
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        let total_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM tags WHERE {filter}"))
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let tags = rows.iter().map(tag_from_row).collect();
        Ok(Page::new(tags, total_row.get("total"), request))
    }

    async fn all(&self) -> RepositoryResult<Vec<Tag>> {
        let rows = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY id DESC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(tag_from_row).collect())
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM tags")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_wildcards_are_escaped() {
        assert_eq!(keyword_pattern(Some("rust")), Some("%rust%".to_string()));
        assert_eq!(keyword_pattern(Some("100%")), Some("%100\\%%".to_string()));
        assert_eq!(keyword_pattern(Some("a\\b")), Some("%a\\\\b%".to_string()));
        assert_eq!(keyword_pattern(Some("\\%")), Some("%\\\\\\%%".to_string()));
        assert_eq!(keyword_pattern(None), None);
    }
}
