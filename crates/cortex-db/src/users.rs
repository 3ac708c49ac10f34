//! User aggregate repository implementation.
//!
//! Maintains the coarse per-user `total_content` / `total_tags` counters.
//! Deltas are applied in a single UPDATE with GREATEST so the zero floor
//! holds even when concurrent requests interleave; the values remain
//! advisory (last-write-wins, no transactional linkage to the source
//! collections).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use cortex_core::{Error, Result, UserAggregate, UserAggregateRepository};

/// PostgreSQL implementation of UserAggregateRepository.
#[derive(Clone)]
pub struct PgUserAggregateRepository {
    pool: Pool<Postgres>,
}

impl PgUserAggregateRepository {
    /// Create a new PgUserAggregateRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn adjust(&self, user_id: &str, column: &str, delta: i32) -> Result<()> {
        let now = Utc::now();

        // Column name comes from the two fixed call sites below, never from
        // input.
        let result = sqlx::query(&format!(
            "UPDATE app_user SET {col} = GREATEST(0, {col} + $2), updated_at = $3 WHERE user_id = $1",
            col = column
        ))
        .bind(user_id)
        .bind(delta)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "user_aggregate",
            op = "adjust",
            user_id = user_id,
            delta = delta,
            row_count = result.rows_affected(),
            counter = column,
            "Adjusted user aggregate counter"
        );

        Ok(())
    }
}

#[async_trait]
impl UserAggregateRepository for PgUserAggregateRepository {
    async fn ensure(&self, user_id: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO app_user (user_id, total_content, total_tags, created_at, updated_at)
            VALUES ($1, 0, 0, $2, $2)
            ON CONFLICT (user_id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserAggregate>> {
        let row = sqlx::query(
            "SELECT user_id, total_content, total_tags, created_at, updated_at
             FROM app_user WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| UserAggregate {
            user_id: r.get("user_id"),
            total_content: r.get("total_content"),
            total_tags: r.get("total_tags"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn adjust_content_count(&self, user_id: &str, delta: i32) -> Result<()> {
        self.adjust(user_id, "total_content", delta).await
    }

    async fn adjust_tags_count(&self, user_id: &str, delta: i32) -> Result<()> {
        self.adjust(user_id, "total_tags", delta).await
    }
}
