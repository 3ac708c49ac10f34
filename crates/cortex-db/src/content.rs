//! Content repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use cortex_core::{
    new_v7, ContentItem, ContentRepository, CreateContentRequest, Error, ListContentRequest,
    ListContentResponse, Result, UpdateContentRequest,
};

/// Normalize a list of tag id references into set form.
///
/// Trims whitespace, drops blanks, collapses duplicates. Output order is
/// deterministic (sorted) so repeated writes of the same set are
/// byte-identical in the store.
pub fn normalize_tag_ids(ids: &[String]) -> Vec<String> {
    let mut set = std::collections::BTreeSet::new();
    for id in ids {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            set.insert(trimmed.to_string());
        }
    }
    set.into_iter().collect()
}

const CONTENT_COLUMNS: &str = "id, user_id, title, description, link, content_type, \
     personal_notes, thumbnail_url, tag_ids, created_at, updated_at";

fn row_to_content(row: &PgRow) -> ContentItem {
    ContentItem {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        description: row.get("description"),
        link: row.get("link"),
        content_type: row.get("content_type"),
        personal_notes: row.get("personal_notes"),
        thumbnail_url: row.get("thumbnail_url"),
        tag_ids: row.get("tag_ids"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of ContentRepository.
#[derive(Clone)]
pub struct PgContentRepository {
    pool: Pool<Postgres>,
}

impl PgContentRepository {
    /// Create a new PgContentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn insert(&self, user_id: &str, req: CreateContentRequest) -> Result<ContentItem> {
        if req.title.trim().is_empty() {
            return Err(Error::InvalidInput("Title cannot be empty".to_string()));
        }
        if req.content_type.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Content type cannot be empty".to_string(),
            ));
        }

        let id = new_v7();
        let now = Utc::now();
        let tag_ids = normalize_tag_ids(&req.tag_ids);

        sqlx::query(
            r#"INSERT INTO content (
                id, user_id, title, description, link, content_type,
                personal_notes, thumbnail_url, tag_ids, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.link)
        .bind(&req.content_type)
        .bind(&req.personal_notes)
        .bind(&req.thumbnail_url)
        .bind(&tag_ids)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ContentItem {
            id,
            user_id: user_id.to_string(),
            title: req.title,
            description: req.description,
            link: req.link,
            content_type: req.content_type,
            personal_notes: req.personal_notes,
            thumbnail_url: req.thumbnail_url,
            tag_ids,
            created_at: now,
            updated_at: now,
        })
    }

    async fn fetch(&self, user_id: &str, id: Uuid) -> Result<ContentItem> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content WHERE user_id = $1 AND id = $2",
            CONTENT_COLUMNS
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::ContentNotFound(id))?;

        Ok(row_to_content(&row))
    }

    async fn list(&self, user_id: &str, req: ListContentRequest) -> Result<ListContentResponse> {
        let limit = req.limit.unwrap_or(50).clamp(1, 200);
        let offset = req.offset.unwrap_or(0).max(0);

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM content WHERE user_id = ",
            CONTENT_COLUMNS
        ));
        qb.push_bind(user_id);
        if let Some(tag_id) = &req.tag_id {
            qb.push(" AND tag_ids @> ARRAY[");
            qb.push_bind(tag_id);
            qb.push("]::text[]");
        }
        if let Some(content_type) = &req.content_type {
            qb.push(" AND content_type = ");
            qb.push_bind(content_type);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let items = rows.iter().map(row_to_content).collect();

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM content WHERE user_id = ");
        count_qb.push_bind(user_id);
        if let Some(tag_id) = &req.tag_id {
            count_qb.push(" AND tag_ids @> ARRAY[");
            count_qb.push_bind(tag_id);
            count_qb.push("]::text[]");
        }
        if let Some(content_type) = &req.content_type {
            count_qb.push(" AND content_type = ");
            count_qb.push_bind(content_type);
        }

        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(ListContentResponse { items, total })
    }

    async fn update(
        &self,
        user_id: &str,
        id: Uuid,
        req: UpdateContentRequest,
    ) -> Result<(ContentItem, Vec<String>)> {
        if let Some(title) = &req.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("Title cannot be empty".to_string()));
            }
        }

        let now = Utc::now();
        let new_tag_ids = req.tag_ids.as_deref().map(normalize_tag_ids);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Capture the prior references under a row lock so the caller can
        // reconcile the union of old and new.
        let old_tag_ids: Vec<String> =
            sqlx::query_scalar("SELECT tag_ids FROM content WHERE user_id = $1 AND id = $2 FOR UPDATE")
                .bind(user_id)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?
                .ok_or(Error::ContentNotFound(id))?;

        let row = sqlx::query(&format!(
            r#"UPDATE content SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                link = COALESCE($5, link),
                content_type = COALESCE($6, content_type),
                personal_notes = COALESCE($7, personal_notes),
                thumbnail_url = COALESCE($8, thumbnail_url),
                tag_ids = COALESCE($9, tag_ids),
                updated_at = $10
            WHERE user_id = $1 AND id = $2
            RETURNING {}"#,
            CONTENT_COLUMNS
        ))
        .bind(user_id)
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.link)
        .bind(&req.content_type)
        .bind(&req.personal_notes)
        .bind(&req.thumbnail_url)
        .bind(&new_tag_ids)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Ok((row_to_content(&row), old_tag_ids))
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<Vec<String>> {
        let tag_ids: Vec<String> =
            sqlx::query_scalar("DELETE FROM content WHERE user_id = $1 AND id = $2 RETURNING tag_ids")
                .bind(user_id)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?
                .ok_or(Error::ContentNotFound(id))?;

        Ok(tag_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_blanks() {
        let ids = vec!["rust".to_string(), "".to_string(), "  ".to_string()];
        assert_eq!(normalize_tag_ids(&ids), vec!["rust".to_string()]);
    }

    #[test]
    fn test_normalize_trims_and_dedups() {
        let ids = vec![
            " rust ".to_string(),
            "rust".to_string(),
            "ml".to_string(),
        ];
        assert_eq!(
            normalize_tag_ids(&ids),
            vec!["ml".to_string(), "rust".to_string()]
        );
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_tag_ids(&[]).is_empty());
    }
}
