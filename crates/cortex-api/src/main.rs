//! HTTP API server for cortex.
//!
//! Thin axum routes over the cortex-db repositories. Mutating content/tag
//! routes perform their primary write, then run counter bookkeeping as an
//! observable best-effort follow-up (see `services::bookkeeping`).
//!
//! Tenant identity comes from the `x-user-id` header installed by the
//! upstream auth gateway; browser-extension routes authenticate with the
//! `x-api-key` issued at pairing time.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use cortex_core::defaults::{DEFAULT_CONNECTION_CEILING, DEFAULT_SWEEP_INTERVAL_SECS};
use cortex_core::{
    BrowserType, ConnectionStatsDelta, ContentRepository, CreateConnectionRequest,
    CreateContentRequest, CreateTagRequest, ExtensionConnection, ExtensionRepository,
    ListContentRequest, TagRepository, UpdateContentRequest, UpdateExtensionSettingsRequest,
    UpdateTagRequest,
};
use cortex_db::Database;

mod services;

use services::{Bookkeeper, RateLimiter};

/// Shared application state.
#[derive(Clone)]
struct AppState {
    db: Database,
    bookkeeper: Bookkeeper,
    rate_limiter: Option<RateLimiter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "cortex_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cortex_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("cortex-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/cortex".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let rate_limit_enabled: bool = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let connection_ceiling: i64 = std::env::var("CONNECTION_CEILING")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONNECTION_CEILING);

    let sweep_interval_secs: u64 = std::env::var("CONNECTION_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, cortex_db::PoolConfig::from_env())
        .await?
        .with_connection_ceiling(connection_ceiling);
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Create rate limiter if enabled
    let rate_limiter = if rate_limit_enabled {
        Some(RateLimiter::from_env().await)
    } else {
        info!("Rate limiting disabled");
        None
    };

    // Periodic stale-connection sweep: demote idle connections to inactive,
    // expire those past their user's timeout.
    spawn_connection_sweep(db.clone(), sweep_interval_secs);

    // Create app state
    let state = AppState {
        bookkeeper: Bookkeeper::new(db.clone()),
        db,
        rate_limiter,
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Content CRUD
        .route("/api/v1/content", get(list_content).post(create_content))
        .route(
            "/api/v1/content/:id",
            get(get_content).patch(update_content).delete(delete_content),
        )
        // Tags
        .route("/api/v1/tags", get(list_tags).post(create_tag))
        .route(
            "/api/v1/tags/:id",
            get(get_tag).patch(update_tag).delete(delete_tag),
        )
        // Extension pairing and lifecycle
        .route(
            "/api/v1/extension/connections",
            get(list_connections).post(pair_connection),
        )
        .route(
            "/api/v1/extension/connections/:id/disconnect",
            post(disconnect_connection),
        )
        .route(
            "/api/v1/extension/settings",
            get(get_extension_settings).patch(update_extension_settings),
        )
        // Extension-authenticated endpoints
        .route("/api/v1/extension/save", post(extension_save))
        .route("/api/v1/extension/heartbeat", post(extension_heartbeat))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("cortex-api listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn the background sweep that maintains connection liveness states.
fn spawn_connection_sweep(db: Database, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(5)));
        loop {
            interval.tick().await;

            match db.extensions.mark_inactive().await {
                Ok(n) if n > 0 => info!(
                    subsystem = "api",
                    component = "sweep",
                    row_count = n,
                    "Marked idle connections inactive"
                ),
                Ok(_) => {}
                Err(e) => warn!(
                    subsystem = "api",
                    component = "sweep",
                    error = %e,
                    "Inactivity sweep failed"
                ),
            }

            match db.extensions.expire_stale().await {
                Ok(n) if n > 0 => info!(
                    subsystem = "api",
                    component = "sweep",
                    row_count = n,
                    "Expired stale connections"
                ),
                Ok(_) => {}
                Err(e) => warn!(
                    subsystem = "api",
                    component = "sweep",
                    error = %e,
                    "Expiry sweep failed"
                ),
            }
        }
    });
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Identify the caller for rate limiting: tenant id when present, source
/// address otherwise.
fn rate_limit_key(headers: &HeaderMap) -> String {
    if let Some(user) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        if !user.trim().is_empty() {
            return format!("user:{}", user.trim());
        }
    }
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown");
    format!("ip:{}", ip)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let key = rate_limit_key(req.headers());
        if !limiter.check(&key).await {
            let body = Json(serde_json::json!({
                "error": "rate_limit_exceeded",
                "message": "Too many requests, slow down",
            }));
            return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        }
    }
    next.run(req).await
}

// =============================================================================
// AUTH HELPERS
// =============================================================================

/// Tenant identity from the auth gateway.
fn require_user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".to_string()))
}

/// Resolve the extension API key to its active connection.
async fn require_connection(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<ExtensionConnection, ApiError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing x-api-key header".to_string()))?;

    state
        .db
        .extensions
        .validate_api_key(api_key)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or revoked API key".to_string()))
}

// =============================================================================
// CONTENT HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateContentBody {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default = "default_content_type")]
    content_type: String,
    #[serde(default)]
    personal_notes: String,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    tag_ids: Vec<String>,
}

fn default_content_type() -> String {
    "link".to_string()
}

impl From<CreateContentBody> for CreateContentRequest {
    fn from(body: CreateContentBody) -> Self {
        Self {
            title: body.title,
            description: body.description,
            link: body.link,
            content_type: body.content_type,
            personal_notes: body.personal_notes,
            thumbnail_url: body.thumbnail_url,
            tag_ids: body.tag_ids,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct UpdateContentBody {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    content_type: Option<String>,
    personal_notes: Option<String>,
    thumbnail_url: Option<String>,
    tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ListContentQuery {
    tag: Option<String>,
    content_type: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn create_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateContentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let item = state.db.content.insert(&user_id, body.into()).await?;

    // Primary write done; counters are best-effort from here.
    state
        .bookkeeper
        .after_content_create(&user_id, &item.tag_ids)
        .await;

    Ok((StatusCode::CREATED, Json(item)))
}

async fn list_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListContentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let response = state
        .db
        .content
        .list(
            &user_id,
            ListContentRequest {
                tag_id: query.tag,
                content_type: query.content_type,
                limit: query.limit,
                offset: query.offset,
            },
        )
        .await?;

    Ok(Json(response))
}

async fn get_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let item = state.db.content.fetch(&user_id, id).await?;
    Ok(Json(item))
}

async fn update_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateContentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let (item, old_tag_ids) = state
        .db
        .content
        .update(
            &user_id,
            id,
            UpdateContentRequest {
                title: body.title,
                description: body.description,
                link: body.link,
                content_type: body.content_type,
                personal_notes: body.personal_notes,
                thumbnail_url: body.thumbnail_url,
                tag_ids: body.tag_ids,
            },
        )
        .await?;

    state
        .bookkeeper
        .after_content_update(&user_id, &old_tag_ids, &item.tag_ids)
        .await;

    Ok(Json(item))
}

async fn delete_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let old_tag_ids = state.db.content.delete(&user_id, id).await?;

    state
        .bookkeeper
        .after_content_delete(&user_id, &old_tag_ids)
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Content deleted successfully"
    })))
}

// =============================================================================
// TAG HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateTagBody {
    tag_name: String,
    color_code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateTagBody {
    color_code: Option<String>,
    description: Option<String>,
}

async fn create_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let (tag, created) = state
        .db
        .tags
        .create(
            &user_id,
            CreateTagRequest {
                tag_name: body.tag_name,
                color_code: body.color_code,
                description: body.description,
            },
        )
        .await?;

    if created {
        state.bookkeeper.after_tag_create(&user_id).await;
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(tag)))
}

async fn list_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let tags = state.db.tags.list(&user_id).await?;
    Ok(Json(tags))
}

async fn get_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let tag = state
        .db
        .tags
        .get(&user_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tag not found: {}", id)))?;
    Ok(Json(tag))
}

async fn update_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let tag = state
        .db
        .tags
        .update(
            &user_id,
            &id,
            UpdateTagRequest {
                color_code: body.color_code,
                description: body.description,
            },
        )
        .await?;

    Ok(Json(tag))
}

async fn delete_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let deleted = state.db.tags.delete(&user_id, &id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Tag not found: {}", id)));
    }

    state.bookkeeper.after_tag_delete(&user_id).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Tag deleted successfully"
    })))
}

// =============================================================================
// EXTENSION HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct PairConnectionBody {
    browser_type: BrowserType,
    device_fingerprint: String,
    device_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct PairConnectionResponse {
    connection: ExtensionConnection,
    /// Shown exactly once; only a new pairing re-issues a key.
    api_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct DisconnectBody {
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateSettingsBody {
    notify_on_connect: Option<bool>,
    connection_timeout_minutes: Option<i32>,
    require_reauth: Option<bool>,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

async fn pair_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PairConnectionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let new = state
        .db
        .extensions
        .create_connection(
            &user_id,
            CreateConnectionRequest {
                browser_type: body.browser_type,
                device_fingerprint: body.device_fingerprint,
                user_agent,
                ip_address: client_ip(&headers),
                device_name: body.device_name,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PairConnectionResponse {
            connection: new.connection,
            api_key: new.api_key,
        }),
    ))
}

async fn list_connections(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let connections = state.db.extensions.list_connections(&user_id).await?;
    Ok(Json(connections))
}

async fn disconnect_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<DisconnectBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let reason = body
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("user requested")
        .to_string();

    state.db.extensions.disconnect(&user_id, id, &reason).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Connection disconnected"
    })))
}

async fn get_extension_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let details = state.db.extensions.get_details(&user_id).await?;
    Ok(Json(details))
}

async fn update_extension_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateSettingsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;

    let details = state
        .db
        .extensions
        .update_settings(
            &user_id,
            UpdateExtensionSettingsRequest {
                notify_on_connect: body.notify_on_connect,
                connection_timeout_minutes: body.connection_timeout_minutes,
                require_reauth: body.require_reauth,
            },
        )
        .await?;

    Ok(Json(details))
}

/// Save content on behalf of a paired extension.
async fn extension_save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateContentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let connection = require_connection(&state, &headers).await?;
    let user_id = connection.user_id.clone();

    let item = state.db.content.insert(&user_id, body.into()).await?;

    state
        .bookkeeper
        .after_content_create(&user_id, &item.tag_ids)
        .await;

    // Touch liveness and per-device counters for this authenticated call.
    state
        .db
        .extensions
        .update_activity(&user_id, connection.id)
        .await?;
    state
        .db
        .extensions
        .update_stats(
            &user_id,
            connection.id,
            ConnectionStatsDelta {
                content_saved: 1,
                api_calls: 1,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Heartbeat from a paired extension; restores `connected` status.
async fn extension_heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let connection = require_connection(&state, &headers).await?;
    let user_id = connection.user_id.clone();

    state
        .db
        .extensions
        .update_activity(&user_id, connection.id)
        .await?;
    state
        .db
        .extensions
        .update_stats(
            &user_id,
            connection.id,
            ConnectionStatsDelta {
                content_saved: 0,
                api_calls: 1,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "connection_id": connection.id,
    })))
}

// =============================================================================
// HEALTH
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Database(cortex_core::Error),
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Capacity(String),
}

impl From<cortex_core::Error> for ApiError {
    fn from(err: cortex_core::Error) -> Self {
        use cortex_core::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::ContentNotFound(id) => ApiError::NotFound(format!("Content not found: {}", id)),
            Error::TagNotFound(id) => ApiError::NotFound(format!("Tag not found: {}", id)),
            Error::ConnectionNotFound(id) => {
                ApiError::NotFound(format!("Connection not found: {}", id))
            }
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::CapacityExceeded(msg) => ApiError::Capacity(msg),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            other => ApiError::Database(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            // The connection ceiling is a per-account limit, not throttling.
            ApiError::Capacity(msg) => (StatusCode::FORBIDDEN, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_require_user_id_present() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-42"));
        assert_eq!(require_user_id(&headers).unwrap(), "user-42");
    }

    #[test]
    fn test_require_user_id_missing() {
        let headers = HeaderMap::new();
        assert!(matches!(
            require_user_id(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_require_user_id_blank_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("   "));
        assert!(require_user_id(&headers).is_err());
    }

    #[test]
    fn test_rate_limit_key_prefers_user() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-42"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(rate_limit_key(&headers), "user:user-42");
    }

    #[test]
    fn test_rate_limit_key_falls_back_to_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(rate_limit_key(&headers), "ip:203.0.113.9");
    }

    #[test]
    fn test_client_ip_none_when_absent() {
        let headers = HeaderMap::new();
        assert!(client_ip(&headers).is_none());
    }

    #[test]
    fn test_capacity_error_maps_to_forbidden() {
        let err: ApiError =
            cortex_core::Error::CapacityExceeded("connection limit".to_string()).into();
        assert!(matches!(err, ApiError::Capacity(_)));
    }

    #[test]
    fn test_conflict_error_maps_to_conflict() {
        let err: ApiError = cortex_core::Error::Conflict("duplicate device".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_not_found_error_maps() {
        let err: ApiError = cortex_core::Error::TagNotFound("rust".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
