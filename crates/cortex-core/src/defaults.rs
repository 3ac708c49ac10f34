//! Default values and tunables shared across cortex crates.
//!
//! Every constant here can be overridden per deployment through environment
//! variables read in the API binary; these are the fallbacks.

/// Maximum simultaneously active extension connections per user.
pub const DEFAULT_CONNECTION_CEILING: i64 = 2;

/// Minutes without a heartbeat before an active connection is expired.
///
/// Stored per user in their extension details; this seeds the lazily created
/// row.
pub const DEFAULT_CONNECTION_TIMEOUT_MINUTES: i32 = 30;

/// Minutes without a heartbeat before a connection is marked inactive.
///
/// Inactive connections return to `connected` on the next heartbeat; expiry
/// (above) is terminal.
pub const DEFAULT_INACTIVITY_MINUTES: i64 = 10;

/// Seconds between stale-connection sweep passes in the API binary.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Length of the random secret half of an issued API key.
pub const API_KEY_SECRET_LEN: usize = 32;

/// Length of the non-secret lookup id embedded in an issued API key.
pub const API_KEY_ID_LEN: usize = 12;

/// Length of the per-connection salt mixed into the key hash.
pub const API_KEY_SALT_LEN: usize = 16;

/// Characters of the issued key kept for display previews.
pub const API_KEY_PREVIEW_LEN: usize = 12;

/// Fallback color assigned to tags created without one.
pub const DEFAULT_TAG_COLOR: &str = "#6366f1";

/// Maximum accepted tag name length.
pub const MAX_TAG_NAME_LEN: usize = 100;

/// Requests allowed per rate-limit window.
pub const DEFAULT_RATE_LIMIT_REQUESTS: u64 = 100;

/// Rate-limit window length in seconds.
pub const DEFAULT_RATE_LIMIT_PERIOD_SECS: u64 = 60;
