//! Extension connection repository implementation.
//!
//! Pairs, validates, and revokes browser-extension device connections. The
//! issued API key has the shape `cx_<key_id>_<secret>`: the key id is a
//! non-secret lookup token stored in the clear and indexed, the secret half
//! is stored only as a salted SHA-256 hash. Validation is therefore a point
//! lookup plus one hash comparison, not a scan over all active connections.
//!
//! Connection create and disconnect bundle the document write with the
//! per-user counter update in one transaction so the counter cannot
//! observably diverge from connection existence.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cortex_core::defaults::{
    API_KEY_ID_LEN, API_KEY_PREVIEW_LEN, API_KEY_SALT_LEN, API_KEY_SECRET_LEN,
    DEFAULT_CONNECTION_CEILING, DEFAULT_INACTIVITY_MINUTES,
};
use cortex_core::{
    new_v7, BrowserType, ConnectionStatsDelta, ConnectionStatus, CreateConnectionRequest, Error,
    ExtensionConnection, ExtensionRepository, ExtensionSettings, NewConnection, Result,
    UpdateExtensionSettingsRequest, UserExtensionDetails,
};

/// Generate a cryptographically secure random string.
fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Hash a key secret with its per-connection salt.
fn hash_secret(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a key secret against its stored salted hash.
fn verify_secret(salt: &str, secret: &str, hash: &str) -> bool {
    hash_secret(salt, secret) == hash
}

/// Assemble the issued key from its lookup id and secret half.
fn compose_api_key(key_id: &str, secret: &str) -> String {
    format!("cx_{}_{}", key_id, secret)
}

/// Split an issued key back into `(key_id, secret)`.
///
/// Returns `None` for keys that do not match the issued shape; callers
/// treat those as validation failures, not errors.
fn parse_api_key(api_key: &str) -> Option<(&str, &str)> {
    let rest = api_key.strip_prefix("cx_")?;
    let (key_id, secret) = rest.split_once('_')?;
    if key_id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((key_id, secret))
}

/// Truncated display form of an issued key.
fn key_preview(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(API_KEY_PREVIEW_LEN).collect();
    format!("{}...", prefix)
}

/// Best-effort OS family from a user-agent string.
fn sniff_os(user_agent: Option<&str>) -> &'static str {
    let ua = match user_agent {
        Some(ua) => ua,
        None => return "Unknown OS",
    };
    if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS") || ua.contains("Macintosh") {
        "macOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Linux") || ua.contains("X11") {
        "Linux"
    } else {
        "Unknown OS"
    }
}

/// Human-readable device name: "Chrome on macOS".
fn derive_device_name(browser: BrowserType, user_agent: Option<&str>) -> String {
    format!("{} on {}", browser.display_name(), sniff_os(user_agent))
}

const CONNECTION_COLUMNS: &str = "id, user_id, device_fingerprint, browser_type, device_name, \
     api_key_id, api_key_preview, status, is_active, connected_at, last_activity, \
     last_heartbeat, disconnected_at, disconnected_reason, total_content_saved, \
     total_api_calls_made, user_agent, ip_address";

/// Parse a connection row, failing fast on shape mismatches instead of
/// propagating loose values.
fn row_to_connection(row: &PgRow) -> Result<ExtensionConnection> {
    let browser_raw: String = row.get("browser_type");
    let browser_type = BrowserType::from_str(&browser_raw).map_err(Error::Internal)?;

    let status_raw: String = row.get("status");
    let status = ConnectionStatus::from_str(&status_raw).map_err(Error::Internal)?;

    Ok(ExtensionConnection {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_fingerprint: row.get("device_fingerprint"),
        browser_type,
        device_name: row.get("device_name"),
        api_key_id: row.get("api_key_id"),
        api_key_preview: row.get("api_key_preview"),
        status,
        is_active: row.get("is_active"),
        connected_at: row.get("connected_at"),
        last_activity: row.get("last_activity"),
        last_heartbeat: row.get("last_heartbeat"),
        disconnected_at: row.get("disconnected_at"),
        disconnected_reason: row.get("disconnected_reason"),
        total_content_saved: row.get("total_content_saved"),
        total_api_calls_made: row.get("total_api_calls_made"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
    })
}

fn row_to_details(row: &PgRow) -> UserExtensionDetails {
    UserExtensionDetails {
        user_id: row.get("user_id"),
        total_active_connections: row.get("total_active_connections"),
        total_historical_connections: row.get("total_historical_connections"),
        last_activity: row.get("last_activity"),
        total_content_saved: row.get("total_content_saved"),
        total_api_calls_all_connections: row.get("total_api_calls_all_connections"),
        settings: ExtensionSettings {
            notify_on_connect: row.get("notify_on_connect"),
            connection_timeout_minutes: row.get("connection_timeout_minutes"),
            require_reauth: row.get("require_reauth"),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of ExtensionRepository.
#[derive(Clone)]
pub struct PgExtensionRepository {
    pool: Pool<Postgres>,
    /// Maximum simultaneously active connections per user.
    ceiling: i64,
}

impl PgExtensionRepository {
    /// Create a new PgExtensionRepository with the default connection ceiling.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            ceiling: DEFAULT_CONNECTION_CEILING,
        }
    }

    /// Override the connection ceiling.
    pub fn with_ceiling(mut self, ceiling: i64) -> Self {
        self.ceiling = ceiling.max(1);
        self
    }

    /// Insert the per-user details row if absent. Safe to call repeatedly.
    async fn ensure_details<'e, E>(&self, executor: E, user_id: &str) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let now = Utc::now();
        let defaults = ExtensionSettings::default();
        sqlx::query(
            r#"INSERT INTO user_extension_details (
                user_id, total_active_connections, total_historical_connections,
                total_content_saved, total_api_calls_all_connections,
                notify_on_connect, connection_timeout_minutes, require_reauth,
                created_at, updated_at
            ) VALUES ($1, 0, 0, 0, 0, $2, $3, $4, $5, $5)
            ON CONFLICT (user_id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(defaults.notify_on_connect)
        .bind(defaults.connection_timeout_minutes)
        .bind(defaults.require_reauth)
        .bind(now)
        .execute(executor)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl ExtensionRepository for PgExtensionRepository {
    async fn create_connection(
        &self,
        user_id: &str,
        req: CreateConnectionRequest,
    ) -> Result<NewConnection> {
        if req.device_fingerprint.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Device fingerprint cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Lazily create, then lock, the details row: the row lock serializes
        // concurrent pairing attempts for the same user so the ceiling and
        // fingerprint checks below cannot race.
        self.ensure_details(&mut *tx, user_id).await?;
        sqlx::query("SELECT user_id FROM user_extension_details WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let active_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM extension_connection WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if active_count >= self.ceiling {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::CapacityExceeded(format!(
                "Connection limit reached ({} active connections). Disconnect a device before pairing a new one",
                self.ceiling
            )));
        }

        let duplicate: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(
                SELECT 1 FROM extension_connection
                WHERE user_id = $1 AND device_fingerprint = $2 AND is_active = true
            )"#,
        )
        .bind(user_id)
        .bind(&req.device_fingerprint)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if duplicate {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::Conflict(
                "This device is already connected".to_string(),
            ));
        }

        let id = new_v7();
        let key_id = generate_secret(API_KEY_ID_LEN);
        let secret = generate_secret(API_KEY_SECRET_LEN);
        let salt = generate_secret(API_KEY_SALT_LEN);
        let api_key = compose_api_key(&key_id, &secret);
        let api_key_hash = hash_secret(&salt, &secret);
        let api_key_preview = key_preview(&api_key);

        let device_name = match req.device_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => derive_device_name(req.browser_type, req.user_agent.as_deref()),
        };

        sqlx::query(
            r#"INSERT INTO extension_connection (
                id, user_id, device_fingerprint, browser_type, device_name,
                api_key_id, api_key_hash, api_key_salt, api_key_preview,
                status, is_active, connected_at, last_activity, last_heartbeat,
                total_content_saved, total_api_calls_made, user_agent, ip_address
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                'connected', true, $10, $10, $10, 0, 0, $11, $12
            )"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&req.device_fingerprint)
        .bind(req.browser_type.as_str())
        .bind(&device_name)
        .bind(&key_id)
        .bind(&api_key_hash)
        .bind(&salt)
        .bind(&api_key_preview)
        .bind(now)
        .bind(&req.user_agent)
        .bind(&req.ip_address)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            r#"UPDATE user_extension_details SET
                total_active_connections = total_active_connections + 1,
                total_historical_connections = total_historical_connections + 1,
                last_activity = $2,
                updated_at = $2
            WHERE user_id = $1"#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        let connection = ExtensionConnection {
            id,
            user_id: user_id.to_string(),
            device_fingerprint: req.device_fingerprint,
            browser_type: req.browser_type,
            device_name,
            api_key_id: key_id,
            api_key_preview,
            status: ConnectionStatus::Connected,
            is_active: true,
            connected_at: now,
            last_activity: now,
            last_heartbeat: now,
            disconnected_at: None,
            disconnected_reason: None,
            total_content_saved: 0,
            total_api_calls_made: 0,
            user_agent: req.user_agent,
            ip_address: req.ip_address,
        };

        // The plaintext key leaves this function exactly once.
        Ok(NewConnection {
            connection,
            api_key,
        })
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<Option<ExtensionConnection>> {
        let (key_id, secret) = match parse_api_key(api_key) {
            Some(parts) => parts,
            None => return Ok(None),
        };

        let row = sqlx::query(&format!(
            "SELECT {}, api_key_hash, api_key_salt FROM extension_connection
             WHERE api_key_id = $1 AND is_active = true",
            CONNECTION_COLUMNS
        ))
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let hash: String = row.get("api_key_hash");
        let salt: String = row.get("api_key_salt");
        if !verify_secret(&salt, secret, &hash) {
            return Ok(None);
        }

        let connection = row_to_connection(&row)?;

        let now = Utc::now();
        sqlx::query("UPDATE extension_connection SET last_activity = $2 WHERE id = $1")
            .bind(connection.id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(Some(connection))
    }

    async fn disconnect(&self, user_id: &str, connection_id: Uuid, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Disconnect reason cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            r#"UPDATE extension_connection SET
                is_active = false,
                status = 'disconnected',
                disconnected_at = $3,
                disconnected_reason = $4,
                last_activity = $3
            WHERE user_id = $1 AND id = $2 AND is_active = true"#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM extension_connection WHERE user_id = $1 AND id = $2)",
            )
            .bind(user_id)
            .bind(connection_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

            tx.rollback().await.map_err(Error::Database)?;
            return if exists {
                // Already disconnected or expired; soft delete is terminal
                // and idempotent.
                Ok(())
            } else {
                Err(Error::ConnectionNotFound(connection_id))
            };
        }

        sqlx::query(
            r#"UPDATE user_extension_details SET
                total_active_connections = GREATEST(0, total_active_connections - 1),
                updated_at = $2
            WHERE user_id = $1"#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn update_activity(&self, user_id: &str, connection_id: Uuid) -> Result<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"UPDATE extension_connection SET
                last_activity = $3,
                last_heartbeat = $3,
                status = 'connected'
            WHERE user_id = $1 AND id = $2 AND is_active = true"#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ConnectionNotFound(connection_id));
        }

        sqlx::query(
            "UPDATE user_extension_details SET last_activity = $2, updated_at = $2 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn update_stats(
        &self,
        user_id: &str,
        connection_id: Uuid,
        delta: ConnectionStatsDelta,
    ) -> Result<()> {
        if delta.content_saved < 0 || delta.api_calls < 0 {
            return Err(Error::InvalidInput(
                "Stat counters are increment-only".to_string(),
            ));
        }
        if delta.content_saved == 0 && delta.api_calls == 0 {
            return Ok(());
        }

        let now = Utc::now();

        // Atomic in-place increments tolerate concurrent calls from the
        // same device without read-modify-write races.
        let result = sqlx::query(
            r#"UPDATE extension_connection SET
                total_content_saved = total_content_saved + $3,
                total_api_calls_made = total_api_calls_made + $4,
                last_activity = $5
            WHERE user_id = $1 AND id = $2 AND is_active = true"#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(delta.content_saved)
        .bind(delta.api_calls)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::ConnectionNotFound(connection_id));
        }

        sqlx::query(
            r#"UPDATE user_extension_details SET
                total_content_saved = total_content_saved + $2,
                total_api_calls_all_connections = total_api_calls_all_connections + $3,
                last_activity = $4,
                updated_at = $4
            WHERE user_id = $1"#,
        )
        .bind(user_id)
        .bind(delta.content_saved)
        .bind(delta.api_calls)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn list_connections(&self, user_id: &str) -> Result<Vec<ExtensionConnection>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM extension_connection WHERE user_id = $1 ORDER BY connected_at DESC",
            CONNECTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_connection).collect()
    }

    async fn get_details(&self, user_id: &str) -> Result<UserExtensionDetails> {
        self.ensure_details(&self.pool, user_id).await?;

        let row = sqlx::query("SELECT * FROM user_extension_details WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row_to_details(&row))
    }

    async fn update_settings(
        &self,
        user_id: &str,
        req: UpdateExtensionSettingsRequest,
    ) -> Result<UserExtensionDetails> {
        if let Some(minutes) = req.connection_timeout_minutes {
            if minutes < 1 {
                return Err(Error::InvalidInput(
                    "Connection timeout must be at least 1 minute".to_string(),
                ));
            }
        }

        self.ensure_details(&self.pool, user_id).await?;

        let now = Utc::now();
        let row = sqlx::query(
            r#"UPDATE user_extension_details SET
                notify_on_connect = COALESCE($2, notify_on_connect),
                connection_timeout_minutes = COALESCE($3, connection_timeout_minutes),
                require_reauth = COALESCE($4, require_reauth),
                updated_at = $5
            WHERE user_id = $1
            RETURNING *"#,
        )
        .bind(user_id)
        .bind(req.notify_on_connect)
        .bind(req.connection_timeout_minutes)
        .bind(req.require_reauth)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row_to_details(&row))
    }

    async fn mark_inactive(&self) -> Result<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"UPDATE extension_connection SET status = 'inactive'
            WHERE is_active = true
              AND status = 'connected'
              AND last_heartbeat < $1 - make_interval(mins => $2)"#,
        )
        .bind(now)
        .bind(DEFAULT_INACTIVITY_MINUTES as i32)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn expire_stale(&self) -> Result<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Each user's own timeout setting governs expiry.
        let expired_users: Vec<String> = sqlx::query_scalar(
            r#"UPDATE extension_connection c SET
                is_active = false,
                status = 'expired',
                disconnected_at = $1,
                disconnected_reason = 'idle timeout'
            FROM user_extension_details d
            WHERE d.user_id = c.user_id
              AND c.is_active = true
              AND c.last_heartbeat < $1 - make_interval(mins => d.connection_timeout_minutes)
            RETURNING c.user_id"#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let mut per_user: std::collections::HashMap<&str, i32> = std::collections::HashMap::new();
        for user_id in &expired_users {
            *per_user.entry(user_id.as_str()).or_insert(0) += 1;
        }

        for (user_id, count) in &per_user {
            sqlx::query(
                r#"UPDATE user_extension_details SET
                    total_active_connections = GREATEST(0, total_active_connections - $2),
                    updated_at = $3
                WHERE user_id = $1"#,
            )
            .bind(user_id)
            .bind(count)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(expired_users.len() as u64)
    }
}
