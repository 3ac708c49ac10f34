//! Core traits for cortex abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CONTENT REPOSITORY
// =============================================================================

/// Request for creating a new content item.
#[derive(Debug, Clone)]
pub struct CreateContentRequest {
    pub title: String,
    pub description: String,
    pub link: Option<String>,
    pub content_type: String,
    pub personal_notes: String,
    pub thumbnail_url: Option<String>,
    /// Tag id references; blanks are dropped, duplicates collapsed.
    pub tag_ids: Vec<String>,
}

/// Request for updating a content item. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateContentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub content_type: Option<String>,
    pub personal_notes: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tag_ids: Option<Vec<String>>,
}

/// Request for listing content.
#[derive(Debug, Clone, Default)]
pub struct ListContentRequest {
    /// Filter: only items referencing this tag id.
    pub tag_id: Option<String>,
    /// Filter: only items of this content type.
    pub content_type: Option<String>,
    /// Maximum results.
    pub limit: Option<i64>,
    /// Pagination offset.
    pub offset: Option<i64>,
}

/// Response for listing content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListContentResponse {
    pub items: Vec<ContentItem>,
    pub total: i64,
}

/// Repository for content CRUD operations.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert a new content item.
    async fn insert(&self, user_id: &str, req: CreateContentRequest) -> Result<ContentItem>;

    /// Fetch a content item by id.
    async fn fetch(&self, user_id: &str, id: Uuid) -> Result<ContentItem>;

    /// List content with filtering and pagination.
    async fn list(&self, user_id: &str, req: ListContentRequest) -> Result<ListContentResponse>;

    /// Update a content item.
    ///
    /// Returns the updated item together with the tag references it held
    /// before the update, so callers can reconcile counters for the union of
    /// old and new references.
    async fn update(
        &self,
        user_id: &str,
        id: Uuid,
        req: UpdateContentRequest,
    ) -> Result<(ContentItem, Vec<String>)>;

    /// Delete a content item, returning the tag references it held.
    async fn delete(&self, user_id: &str, id: Uuid) -> Result<Vec<String>>;
}

// =============================================================================
// TAG REPOSITORY
// =============================================================================

/// Request for creating a tag. The id is derived from the name.
#[derive(Debug, Clone)]
pub struct CreateTagRequest {
    pub tag_name: String,
    pub color_code: Option<String>,
    pub description: Option<String>,
}

/// Request for updating a tag. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateTagRequest {
    pub color_code: Option<String>,
    pub description: Option<String>,
}

/// Repository for tag operations, including denormalized counter upkeep.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a tag if it doesn't exist.
    ///
    /// Returns the tag and whether this call created it. Creating a tag
    /// whose name slugs to an existing id returns the existing tag
    /// unchanged.
    async fn create(&self, user_id: &str, req: CreateTagRequest) -> Result<(Tag, bool)>;

    /// Get a tag by id.
    async fn get(&self, user_id: &str, tag_id: &str) -> Result<Option<Tag>>;

    /// List all tags for a user.
    async fn list(&self, user_id: &str) -> Result<Vec<Tag>>;

    /// Update a tag's display fields.
    async fn update(&self, user_id: &str, tag_id: &str, req: UpdateTagRequest) -> Result<Tag>;

    /// Delete a tag, removing its id from every content item referencing it.
    ///
    /// Returns whether a tag was deleted.
    async fn delete(&self, user_id: &str, tag_id: &str) -> Result<bool>;

    /// Recompute one tag's `content_count` from the content collection.
    ///
    /// Counts content items whose references contain the tag id and
    /// overwrites the stored counter. Silent no-op for blank ids and for
    /// tags that do not exist. Idempotent and safe to retry: the counter is
    /// recomputed from source, never incremented.
    async fn reconcile_content_count(&self, user_id: &str, tag_id: &str) -> Result<()>;

    /// Recompute counters for several tags concurrently.
    async fn reconcile_many(&self, user_id: &str, tag_ids: &[String]) -> Result<ReconcileReport>;

    /// Recompute counters for every tag touched by a reference change.
    ///
    /// `old_ids` and `new_ids` are the references attached to one content
    /// item before and after an edit or delete; the union of both is
    /// reconciled. Recounting an unchanged tag is harmless because
    /// recompute is idempotent.
    async fn reconcile_for_change(
        &self,
        user_id: &str,
        old_ids: &[String],
        new_ids: &[String],
    ) -> Result<ReconcileReport>;
}

// =============================================================================
// USER AGGREGATE REPOSITORY
// =============================================================================

/// Repository for coarse per-user totals.
///
/// Adjustments clamp at zero and are advisory: last-write-wins under
/// concurrency, acceptable because the values are display-only.
#[async_trait]
pub trait UserAggregateRepository: Send + Sync {
    /// Create the aggregate row if absent.
    async fn ensure(&self, user_id: &str) -> Result<()>;

    /// Fetch the aggregate, if it exists.
    async fn get(&self, user_id: &str) -> Result<Option<UserAggregate>>;

    /// Apply a signed delta to `total_content`, floored at 0.
    /// No-op when the aggregate row does not exist.
    async fn adjust_content_count(&self, user_id: &str, delta: i32) -> Result<()>;

    /// Apply a signed delta to `total_tags`, floored at 0.
    /// No-op when the aggregate row does not exist.
    async fn adjust_tags_count(&self, user_id: &str, delta: i32) -> Result<()>;
}

// =============================================================================
// EXTENSION REPOSITORY
// =============================================================================

/// Request for pairing a new extension connection.
#[derive(Debug, Clone)]
pub struct CreateConnectionRequest {
    pub browser_type: BrowserType,
    pub device_fingerprint: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    /// Explicit device name; derived from browser + user agent when absent.
    pub device_name: Option<String>,
}

/// A freshly paired connection plus its one-time plaintext key.
///
/// The key cannot be recovered after this value is dropped; only a new
/// pairing re-issues one.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub connection: ExtensionConnection,
    pub api_key: String,
}

/// Increment-only stat deltas for one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionStatsDelta {
    pub content_saved: i32,
    pub api_calls: i32,
}

/// Request for updating per-user extension settings.
#[derive(Debug, Clone, Default)]
pub struct UpdateExtensionSettingsRequest {
    pub notify_on_connect: Option<bool>,
    pub connection_timeout_minutes: Option<i32>,
    pub require_reauth: Option<bool>,
}

/// Repository for extension connection pairing, validation, and revocation.
#[async_trait]
pub trait ExtensionRepository: Send + Sync {
    /// Pair a new device.
    ///
    /// Fails with [`crate::Error::CapacityExceeded`] when the user already
    /// has the configured ceiling of active connections, and with
    /// [`crate::Error::Conflict`] when an active connection shares the
    /// device fingerprint. Connection insert and counter update happen in
    /// one transaction.
    async fn create_connection(
        &self,
        user_id: &str,
        req: CreateConnectionRequest,
    ) -> Result<NewConnection>;

    /// Resolve an API key to its active connection, touching
    /// `last_activity` on success. Returns `None` for unknown, inactive,
    /// or tampered keys.
    async fn validate_api_key(&self, api_key: &str) -> Result<Option<ExtensionConnection>>;

    /// Soft-delete a connection: mark it disconnected with a reason and
    /// decrement the user's active counter (floored at 0) in one
    /// transaction. The row is retained for history.
    async fn disconnect(&self, user_id: &str, connection_id: Uuid, reason: &str) -> Result<()>;

    /// Touch `last_activity`/`last_heartbeat` and force status back to
    /// `connected`.
    async fn update_activity(&self, user_id: &str, connection_id: Uuid) -> Result<()>;

    /// Apply increment-only stat counters to a connection and mirror them
    /// into the user's extension details.
    async fn update_stats(
        &self,
        user_id: &str,
        connection_id: Uuid,
        delta: ConnectionStatsDelta,
    ) -> Result<()>;

    /// List every connection for a user, active and historical.
    async fn list_connections(&self, user_id: &str) -> Result<Vec<ExtensionConnection>>;

    /// Fetch the user's extension details, creating the row lazily.
    async fn get_details(&self, user_id: &str) -> Result<UserExtensionDetails>;

    /// Update per-user extension settings.
    async fn update_settings(
        &self,
        user_id: &str,
        req: UpdateExtensionSettingsRequest,
    ) -> Result<UserExtensionDetails>;

    /// Mark active connections without a recent heartbeat as `inactive`.
    /// Returns the number of rows transitioned.
    async fn mark_inactive(&self) -> Result<u64>;

    /// Expire active connections idle past each user's
    /// `connection_timeout_minutes`. Terminal like disconnect; decrements
    /// active counters. Returns the number of rows expired.
    async fn expire_stale(&self) -> Result<u64>;
}
