//! Post-write bookkeeping for content and tag mutations.
//!
//! Every mutating route performs its primary write first, then hands the
//! follow-up counter work to this service. The repositories return their
//! errors; this layer is where the best-effort policy lives: failures are
//! logged with enough structure to alert on and then suppressed, so the
//! primary write never fails or rolls back on account of bookkeeping.
//! Counters stay stale until the next successful reconcile touches them.

use tracing::warn;

use cortex_core::{ReconcileReport, TagRepository, UserAggregateRepository};
use cortex_db::Database;

/// Runs denormalized-counter upkeep after primary writes.
#[derive(Clone)]
pub struct Bookkeeper {
    db: Database,
}

impl Bookkeeper {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn log_report(&self, user_id: &str, op: &str, report: &ReconcileReport) {
        for failure in &report.failed {
            warn!(
                subsystem = "bookkeeping",
                component = "reconciler",
                op = op,
                user_id = user_id,
                tag_id = %failure.tag_id,
                error = %failure.reason,
                "Tag count reconcile failed; counter stays stale until next pass"
            );
        }
    }

    /// Follow-up for a content create: count the new references and bump the
    /// user total. Initializes the aggregate row, since create is the
    /// primary entity creation flow.
    pub async fn after_content_create(&self, user_id: &str, tag_ids: &[String]) {
        match self.db.tags.reconcile_many(user_id, tag_ids).await {
            Ok(report) => self.log_report(user_id, "content_create", &report),
            Err(e) => warn!(
                subsystem = "bookkeeping",
                op = "content_create",
                user_id = user_id,
                error = %e,
                "Batch reconcile failed"
            ),
        }

        if let Err(e) = self.db.users.ensure(user_id).await {
            warn!(
                subsystem = "bookkeeping",
                op = "content_create",
                user_id = user_id,
                error = %e,
                "User aggregate init failed"
            );
            return;
        }
        if let Err(e) = self.db.users.adjust_content_count(user_id, 1).await {
            warn!(
                subsystem = "bookkeeping",
                op = "content_create",
                user_id = user_id,
                error = %e,
                "User content counter adjust failed"
            );
        }
    }

    /// Follow-up for a content edit: reconcile the union of old and new
    /// references.
    pub async fn after_content_update(&self, user_id: &str, old_ids: &[String], new_ids: &[String]) {
        match self
            .db
            .tags
            .reconcile_for_change(user_id, old_ids, new_ids)
            .await
        {
            Ok(report) => self.log_report(user_id, "content_update", &report),
            Err(e) => warn!(
                subsystem = "bookkeeping",
                op = "content_update",
                user_id = user_id,
                error = %e,
                "Batch reconcile failed"
            ),
        }
    }

    /// Follow-up for a content delete: recount every tag the item
    /// referenced and decrement the user total.
    pub async fn after_content_delete(&self, user_id: &str, old_ids: &[String]) {
        match self.db.tags.reconcile_many(user_id, old_ids).await {
            Ok(report) => self.log_report(user_id, "content_delete", &report),
            Err(e) => warn!(
                subsystem = "bookkeeping",
                op = "content_delete",
                user_id = user_id,
                error = %e,
                "Batch reconcile failed"
            ),
        }

        if let Err(e) = self.db.users.adjust_content_count(user_id, -1).await {
            warn!(
                subsystem = "bookkeeping",
                op = "content_delete",
                user_id = user_id,
                error = %e,
                "User content counter adjust failed"
            );
        }
    }

    /// Follow-up for a tag create.
    pub async fn after_tag_create(&self, user_id: &str) {
        if let Err(e) = self.db.users.ensure(user_id).await {
            warn!(
                subsystem = "bookkeeping",
                op = "tag_create",
                user_id = user_id,
                error = %e,
                "User aggregate init failed"
            );
            return;
        }
        if let Err(e) = self.db.users.adjust_tags_count(user_id, 1).await {
            warn!(
                subsystem = "bookkeeping",
                op = "tag_create",
                user_id = user_id,
                error = %e,
                "User tag counter adjust failed"
            );
        }
    }

    /// Follow-up for a tag delete.
    pub async fn after_tag_delete(&self, user_id: &str) {
        if let Err(e) = self.db.users.adjust_tags_count(user_id, -1).await {
            warn!(
                subsystem = "bookkeeping",
                op = "tag_delete",
                user_id = user_id,
                error = %e,
                "User tag counter adjust failed"
            );
        }
    }
}
