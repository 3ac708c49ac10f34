//! # cortex-db
//!
//! PostgreSQL database layer for cortex.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for all core entities
//! - The tag-count reconciler and batch reference updater
//! - The extension connection manager (pairing, key validation, revocation)
//!
//! ## Example
//!
//! ```rust,ignore
//! use cortex_db::Database;
//! use cortex_core::{ContentRepository, CreateContentRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cortex").await?;
//!
//!     let item = db.content.insert("user-1", CreateContentRequest {
//!         title: "Fearless concurrency".to_string(),
//!         description: String::new(),
//!         link: Some("https://doc.rust-lang.org/book".to_string()),
//!         content_type: "article".to_string(),
//!         personal_notes: String::new(),
//!         thumbnail_url: None,
//!         tag_ids: vec!["rust".to_string()],
//!     }).await?;
//!
//!     println!("Saved content: {}", item.id);
//!     Ok(())
//! }
//! ```
pub mod content;
pub mod extensions;
pub mod pool;
pub mod tags;
pub mod users;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use cortex_core::*;

// Re-export repository implementations
pub use content::{normalize_tag_ids, PgContentRepository};
pub use extensions::PgExtensionRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tags::{affected_tag_ids, PgTagRepository};
pub use users::PgUserAggregateRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Content repository for CRUD operations.
    pub content: PgContentRepository,
    /// Tag repository, including the content-count reconciler.
    pub tags: PgTagRepository,
    /// User aggregate counters.
    pub users: PgUserAggregateRepository,
    /// Extension connection manager.
    pub extensions: PgExtensionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            content: PgContentRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            users: PgUserAggregateRepository::new(pool.clone()),
            extensions: PgExtensionRepository::new(pool.clone()),
            pool,
        }
    }

    /// Override the extension connection ceiling.
    pub fn with_connection_ceiling(mut self, ceiling: i64) -> Self {
        self.extensions = PgExtensionRepository::new(self.pool.clone()).with_ceiling(ceiling);
        self
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
