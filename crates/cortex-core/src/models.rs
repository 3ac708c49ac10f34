//! Core data models for cortex.
//!
//! These types are shared across all cortex crates and represent the core
//! domain entities. Everything here is tenant-scoped: a `user_id` names the
//! isolated namespace a row belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// USER AGGREGATE
// =============================================================================

/// Coarse per-user totals, maintained via signed increments.
///
/// Both counters are advisory approximations of the true collection sizes:
/// they are clamped at zero and eventually consistent, never used for access
/// control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAggregate {
    pub user_id: String,
    pub total_content: i32,
    pub total_tags: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// CONTENT
// =============================================================================

/// One saved piece of content (link, article, video, note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub content_type: String,
    pub personal_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Tag id references. Set semantics: order irrelevant, no duplicates.
    pub tag_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// TAGS
// =============================================================================

/// A user-defined label.
///
/// The id is derived deterministically from `tag_name` by slugification, so
/// the same name always yields the same id within a tenant. `content_count`
/// is denormalized and recomputed on demand by the reconciler; it can drift
/// transiently between reconciliation passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub user_id: String,
    pub tag_name: String,
    pub color_code: String,
    pub description: String,
    pub content_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a batch reconcile pass.
///
/// Reconciliation is best-effort with respect to the primary write: callers
/// receive the per-tag failures and decide whether to log, retry, or enqueue
/// a background sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Tag ids whose counters were recomputed.
    pub reconciled: Vec<String>,
    /// Tag ids whose recompute failed, with the storage error message.
    pub failed: Vec<ReconcileFailure>,
}

/// A single failed reconcile within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileFailure {
    pub tag_id: String,
    pub reason: String,
}

impl ReconcileReport {
    /// True when every reconcile in the batch succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// EXTENSION CONNECTIONS
// =============================================================================

/// Browser family of a paired extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Chrome,
    Firefox,
    Safari,
    Edge,
}

impl BrowserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Safari => "safari",
            Self::Edge => "edge",
        }
    }

    /// Human-facing product name, used when deriving device names.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
            Self::Edge => "Edge",
        }
    }
}

impl std::fmt::Display for BrowserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BrowserType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chrome" => Ok(Self::Chrome),
            "firefox" => Ok(Self::Firefox),
            "safari" => Ok(Self::Safari),
            "edge" => Ok(Self::Edge),
            other => Err(format!("unknown browser type: {}", other)),
        }
    }
}

/// Lifecycle state of an extension connection.
///
/// `connected → inactive → connected` is reachable repeatedly via heartbeat.
/// `disconnected` and `expired` are terminal: reconnecting creates a new
/// connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Inactive,
    Disconnected,
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Inactive => "inactive",
            Self::Disconnected => "disconnected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "inactive" => Ok(Self::Inactive),
            "disconnected" => Ok(Self::Disconnected),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown connection status: {}", other)),
        }
    }
}

/// One authorized device/browser pairing.
///
/// The API key secret is never stored: only its salted hash lives in the
/// store, alongside a truncated preview for display. This struct carries
/// neither hash nor salt, so handing it to API responses cannot leak key
/// material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionConnection {
    pub id: Uuid,
    pub user_id: String,
    pub device_fingerprint: String,
    pub browser_type: BrowserType,
    pub device_name: String,
    /// Non-secret lookup token embedded in the issued key.
    pub api_key_id: String,
    /// Truncated display form of the issued key.
    pub api_key_preview: String,
    pub status: ConnectionStatus,
    pub is_active: bool,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_reason: Option<String>,
    pub total_content_saved: i32,
    pub total_api_calls_made: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Per-user extension settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionSettings {
    pub notify_on_connect: bool,
    pub connection_timeout_minutes: i32,
    pub require_reauth: bool,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            notify_on_connect: true,
            connection_timeout_minutes: crate::defaults::DEFAULT_CONNECTION_TIMEOUT_MINUTES,
            require_reauth: false,
        }
    }
}

/// Per-user aggregate of connection history, created lazily on the first
/// pairing attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExtensionDetails {
    pub user_id: String,
    pub total_active_connections: i32,
    pub total_historical_connections: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    pub total_content_saved: i32,
    pub total_api_calls_all_connections: i32,
    pub settings: ExtensionSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_browser_type_roundtrip() {
        for browser in [
            BrowserType::Chrome,
            BrowserType::Firefox,
            BrowserType::Safari,
            BrowserType::Edge,
        ] {
            let parsed = BrowserType::from_str(browser.as_str()).unwrap();
            assert_eq!(parsed, browser);
        }
    }

    #[test]
    fn test_browser_type_rejects_unknown() {
        assert!(BrowserType::from_str("netscape").is_err());
    }

    #[test]
    fn test_connection_status_roundtrip() {
        for status in [
            ConnectionStatus::Connected,
            ConnectionStatus::Inactive,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Expired,
        ] {
            let parsed = ConnectionStatus::from_str(status.as_str()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_browser_type_serde_lowercase() {
        let json = serde_json::to_string(&BrowserType::Firefox).unwrap();
        assert_eq!(json, "\"firefox\"");
        let back: BrowserType = serde_json::from_str("\"edge\"").unwrap();
        assert_eq!(back, BrowserType::Edge);
    }

    #[test]
    fn test_reconcile_report_is_clean() {
        let mut report = ReconcileReport::default();
        assert!(report.is_clean());

        report.reconciled.push("rust".to_string());
        assert!(report.is_clean());

        report.failed.push(ReconcileFailure {
            tag_id: "ml".to_string(),
            reason: "connection reset".to_string(),
        });
        assert!(!report.is_clean());
    }

    #[test]
    fn test_extension_settings_default() {
        let settings = ExtensionSettings::default();
        assert!(settings.notify_on_connect);
        assert!(!settings.require_reauth);
        assert!(settings.connection_timeout_minutes > 0);
    }
}
