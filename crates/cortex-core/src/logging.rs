//! Structured logging schema and field name constants for cortex.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "bookkeeping", "extension"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "reconciler", "pool", "rate_limit", "sweep"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "reconcile", "create_connection", "adjust_content_count"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tenant (end-user) identifier.
pub const USER_ID: &str = "user_id";

/// Content item UUID being operated on.
pub const CONTENT_ID: &str = "content_id";

/// Tag id (slug) being operated on.
pub const TAG_ID: &str = "tag_id";

/// Extension connection UUID.
pub const CONNECTION_ID: &str = "connection_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of tags touched by a batch reconcile.
pub const TAG_COUNT: &str = "tag_count";

/// Number of rows affected by a sweep or bulk statement.
pub const ROW_COUNT: &str = "row_count";

/// Signed delta applied to an aggregate counter.
pub const DELTA: &str = "delta";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
