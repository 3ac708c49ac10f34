//! Tag repository implementation, including the content-count reconciler.
//!
//! Tag `content_count` values are denormalized: the authoritative source is
//! the `tag_ids` array on each content row. The reconciler recomputes the
//! stored counter from an array-containment count in a single statement, so
//! it converges from arbitrary prior drift and is safe to retry.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use cortex_core::defaults::DEFAULT_TAG_COLOR;
use cortex_core::{
    tag_id_from_name, validate_tag_name, CreateTagRequest, Error, ReconcileFailure,
    ReconcileReport, Result, Tag, TagRepository, UpdateTagRequest,
};

/// Union of two reference sets, blanks dropped, duplicates collapsed.
///
/// Used to decide which tags to recount after a content edit or delete: any
/// tag whose association changed (added, removed, or merely touched) is
/// recounted. The union over-approximates the symmetric difference, which is
/// harmless because recompute is idempotent.
pub fn affected_tag_ids(old_ids: &[String], new_ids: &[String]) -> Vec<String> {
    let mut set = std::collections::BTreeSet::new();
    for id in old_ids.iter().chain(new_ids) {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            set.insert(trimmed.to_string());
        }
    }
    set.into_iter().collect()
}

const TAG_COLUMNS: &str =
    "user_id, id, tag_name, color_code, description, content_count, created_at, updated_at";

fn row_to_tag(row: &PgRow) -> Tag {
    Tag {
        user_id: row.get("user_id"),
        id: row.get("id"),
        tag_name: row.get("tag_name"),
        color_code: row.get("color_code"),
        description: row.get("description"),
        content_count: row.get("content_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of TagRepository.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    /// Create a new PgTagRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn create(&self, user_id: &str, req: CreateTagRequest) -> Result<(Tag, bool)> {
        validate_tag_name(&req.tag_name).map_err(Error::InvalidInput)?;

        let id = tag_id_from_name(&req.tag_name);
        let color = req
            .color_code
            .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string());
        let description = req.description.unwrap_or_default();
        let now = Utc::now();

        // Same name always slugs to the same id, so a re-create resolves to
        // the existing row untouched.
        let result = sqlx::query(
            r#"INSERT INTO tag (user_id, id, tag_name, color_code, description,
                content_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
            ON CONFLICT (user_id, id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(&id)
        .bind(&req.tag_name)
        .bind(&color)
        .bind(&description)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let created = result.rows_affected() == 1;

        let tag = self
            .get(user_id, &id)
            .await?
            .ok_or_else(|| Error::TagNotFound(id.clone()))?;

        Ok((tag, created))
    }

    async fn get(&self, user_id: &str, tag_id: &str) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tag WHERE user_id = $1 AND id = $2",
            TAG_COLUMNS
        ))
        .bind(user_id)
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| row_to_tag(&r)))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tag WHERE user_id = $1 ORDER BY tag_name",
            TAG_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_tag).collect())
    }

    async fn update(&self, user_id: &str, tag_id: &str, req: UpdateTagRequest) -> Result<Tag> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"UPDATE tag SET
                color_code = COALESCE($3, color_code),
                description = COALESCE($4, description),
                updated_at = $5
            WHERE user_id = $1 AND id = $2
            RETURNING {}"#,
            TAG_COLUMNS
        ))
        .bind(user_id)
        .bind(tag_id)
        .bind(&req.color_code)
        .bind(&req.description)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::TagNotFound(tag_id.to_string()))?;

        Ok(row_to_tag(&row))
    }

    async fn delete(&self, user_id: &str, tag_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query("DELETE FROM tag WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        // Strip the reference from every content item so no dangling ids
        // remain.
        sqlx::query(
            "UPDATE content SET tag_ids = array_remove(tag_ids, $2)
             WHERE user_id = $1 AND tag_ids @> ARRAY[$2]::text[]",
        )
        .bind(user_id)
        .bind(tag_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(true)
    }

    async fn reconcile_content_count(&self, user_id: &str, tag_id: &str) -> Result<()> {
        if tag_id.trim().is_empty() {
            return Ok(());
        }

        let now = Utc::now();

        // Recompute from source in one statement: missing tag rows simply
        // affect zero rows.
        let result = sqlx::query(
            r#"UPDATE tag SET
                content_count = (
                    SELECT COUNT(*)::int FROM content
                    WHERE user_id = $1 AND tag_ids @> ARRAY[$2]::text[]
                ),
                updated_at = $3
            WHERE user_id = $1 AND id = $2"#,
        )
        .bind(user_id)
        .bind(tag_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "reconciler",
            op = "reconcile",
            user_id = user_id,
            tag_id = tag_id,
            row_count = result.rows_affected(),
            "Recomputed tag content count"
        );

        Ok(())
    }

    async fn reconcile_many(&self, user_id: &str, tag_ids: &[String]) -> Result<ReconcileReport> {
        let ids = affected_tag_ids(tag_ids, &[]);
        if ids.is_empty() {
            return Ok(ReconcileReport::default());
        }

        let outcomes = join_all(
            ids.iter()
                .map(|id| async move { (id.clone(), self.reconcile_content_count(user_id, id).await) }),
        )
        .await;

        let mut report = ReconcileReport::default();
        for (tag_id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.reconciled.push(tag_id),
                Err(e) => report.failed.push(ReconcileFailure {
                    tag_id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(report)
    }

    async fn reconcile_for_change(
        &self,
        user_id: &str,
        old_ids: &[String],
        new_ids: &[String],
    ) -> Result<ReconcileReport> {
        let union = affected_tag_ids(old_ids, new_ids);
        self.reconcile_many(user_id, &union).await
    }
}
