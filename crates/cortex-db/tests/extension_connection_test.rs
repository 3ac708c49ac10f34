//! Integration tests for the extension connection manager.
//!
//! Covers the connection ceiling, duplicate-device rejection, API key
//! validation, soft-delete retention, and stat counters.

use cortex_core::{
    BrowserType, ConnectionStatsDelta, ConnectionStatus, CreateConnectionRequest, Error,
    ExtensionRepository,
};
use cortex_db::test_fixtures::{cleanup_user, connect_test_db, unique_user};

fn pairing(fingerprint: &str) -> CreateConnectionRequest {
    CreateConnectionRequest {
        browser_type: BrowserType::Chrome,
        device_fingerprint: fingerprint.to_string(),
        user_agent: Some("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)".to_string()),
        ip_address: Some("203.0.113.7".to_string()),
        device_name: None,
    }
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_pairing_returns_one_time_key() {
    let db = connect_test_db().await;
    let user = unique_user("pairing");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    assert!(new.api_key.starts_with("cx_"));
    assert_eq!(new.connection.status, ConnectionStatus::Connected);
    assert!(new.connection.is_active);
    assert_eq!(new.connection.device_name, "Chrome on macOS");
    // The preview must not reveal the whole key.
    assert!(new.connection.api_key_preview.len() < new.api_key.len());

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_active_connections, 1);
    assert_eq!(details.total_historical_connections, 1);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_connection_ceiling_enforced() {
    let db = connect_test_db().await;
    let user = unique_user("ceiling");

    db.extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();
    db.extensions
        .create_connection(&user, pairing("device-2"))
        .await
        .unwrap();

    let third = db
        .extensions
        .create_connection(&user, pairing("device-3"))
        .await;
    assert!(matches!(third, Err(Error::CapacityExceeded(_))));

    // The failed pairing must not have created a row.
    let connections = db.extensions.list_connections(&user).await.unwrap();
    assert_eq!(connections.len(), 2);

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_active_connections, 2);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_duplicate_fingerprint_rejected() {
    let db = connect_test_db().await;
    let user = unique_user("duplicate");

    let first = db
        .extensions
        .create_connection(&user, pairing("same-device"))
        .await
        .unwrap();

    let second = db
        .extensions
        .create_connection(&user, pairing("same-device"))
        .await;
    assert!(matches!(second, Err(Error::Conflict(_))));

    // The first connection survives, still active and uniquely counted.
    let connections = db.extensions.list_connections(&user).await.unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].id, first.connection.id);
    assert!(connections[0].is_active);

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_active_connections, 1);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_validate_api_key() {
    let db = connect_test_db().await;
    let user = unique_user("validate");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    // The correct key resolves to the connection.
    let found = db.extensions.validate_api_key(&new.api_key).await.unwrap();
    assert_eq!(found.unwrap().id, new.connection.id);

    // Any altered character fails.
    let mut tampered = new.api_key.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'x' { 'y' } else { 'x' });
    assert!(db
        .extensions
        .validate_api_key(&tampered)
        .await
        .unwrap()
        .is_none());

    // Garbage shapes fail without error.
    assert!(db.extensions.validate_api_key("").await.unwrap().is_none());
    assert!(db
        .extensions
        .validate_api_key("cx_not_a_real_key")
        .await
        .unwrap()
        .is_none());

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_secret_not_recoverable_from_store() {
    let db = connect_test_db().await;
    let user = unique_user("secret");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    // The secret half of the issued key must not appear in any stored
    // column.
    let secret = new.api_key.rsplit('_').next().unwrap().to_string();
    let leaked: bool = sqlx::query_scalar(
        r#"SELECT EXISTS(
            SELECT 1 FROM extension_connection
            WHERE user_id = $1 AND (
                api_key_hash LIKE '%' || $2 || '%'
                OR api_key_preview LIKE '%' || $2 || '%'
                OR api_key_id LIKE '%' || $2 || '%'
            )
        )"#,
    )
    .bind(&user)
    .bind(&secret)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert!(!leaked, "plaintext secret must never be stored");

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_disconnect_is_soft_delete() {
    let db = connect_test_db().await;
    let user = unique_user("disconnect");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    db.extensions
        .disconnect(&user, new.connection.id, "user requested")
        .await
        .unwrap();

    // The row survives with terminal state and a recorded reason.
    let connections = db.extensions.list_connections(&user).await.unwrap();
    assert_eq!(connections.len(), 1);
    let conn = &connections[0];
    assert!(!conn.is_active);
    assert_eq!(conn.status, ConnectionStatus::Disconnected);
    assert_eq!(conn.disconnected_reason.as_deref(), Some("user requested"));
    assert!(conn.disconnected_at.is_some());

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_active_connections, 0);

    // The key no longer validates.
    assert!(db
        .extensions
        .validate_api_key(&new.api_key)
        .await
        .unwrap()
        .is_none());

    // Disconnecting again is an idempotent no-op; an unknown id is an error.
    db.extensions
        .disconnect(&user, new.connection.id, "again")
        .await
        .unwrap();
    let missing = db
        .extensions
        .disconnect(&user, uuid::Uuid::new_v4(), "nope")
        .await;
    assert!(matches!(missing, Err(Error::ConnectionNotFound(_))));

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_disconnect_frees_a_slot() {
    let db = connect_test_db().await;
    let user = unique_user("slot");

    let first = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();
    db.extensions
        .create_connection(&user, pairing("device-2"))
        .await
        .unwrap();

    db.extensions
        .disconnect(&user, first.connection.id, "making room")
        .await
        .unwrap();

    // A slot opened up; even the same fingerprint may pair again because
    // the old connection is no longer active.
    db.extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_active_connections, 2);
    assert_eq!(details.total_historical_connections, 3);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_activity_restores_connected_status() {
    let db = connect_test_db().await;
    let user = unique_user("activity");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    // Simulate the sweep demoting an idle connection.
    sqlx::query("UPDATE extension_connection SET status = 'inactive' WHERE id = $1")
        .bind(new.connection.id)
        .execute(&db.pool)
        .await
        .unwrap();

    db.extensions
        .update_activity(&user, new.connection.id)
        .await
        .unwrap();

    let connections = db.extensions.list_connections(&user).await.unwrap();
    assert_eq!(connections[0].status, ConnectionStatus::Connected);

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_stats_increment_and_mirror() {
    let db = connect_test_db().await;
    let user = unique_user("stats");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    db.extensions
        .update_stats(
            &user,
            new.connection.id,
            ConnectionStatsDelta {
                content_saved: 1,
                api_calls: 1,
            },
        )
        .await
        .unwrap();
    db.extensions
        .update_stats(
            &user,
            new.connection.id,
            ConnectionStatsDelta {
                content_saved: 0,
                api_calls: 2,
            },
        )
        .await
        .unwrap();

    let connections = db.extensions.list_connections(&user).await.unwrap();
    assert_eq!(connections[0].total_content_saved, 1);
    assert_eq!(connections[0].total_api_calls_made, 3);

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_content_saved, 1);
    assert_eq!(details.total_api_calls_all_connections, 3);

    // Negative deltas are rejected: the counters are monotonic.
    let bad = db
        .extensions
        .update_stats(
            &user,
            new.connection.id,
            ConnectionStatsDelta {
                content_saved: -1,
                api_calls: 0,
            },
        )
        .await;
    assert!(matches!(bad, Err(Error::InvalidInput(_))));

    cleanup_user(&db, &user).await;
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_expiry_sweep_uses_user_timeout() {
    let db = connect_test_db().await;
    let user = unique_user("expiry");

    let new = db
        .extensions
        .create_connection(&user, pairing("device-1"))
        .await
        .unwrap();

    // Backdate the heartbeat far beyond the default timeout.
    sqlx::query(
        "UPDATE extension_connection SET last_heartbeat = NOW() - INTERVAL '2 hours' WHERE id = $1",
    )
    .bind(new.connection.id)
    .execute(&db.pool)
    .await
    .unwrap();

    let expired = db.extensions.expire_stale().await.unwrap();
    assert!(expired >= 1);

    let connections = db.extensions.list_connections(&user).await.unwrap();
    assert_eq!(connections[0].status, ConnectionStatus::Expired);
    assert!(!connections[0].is_active);

    let details = db.extensions.get_details(&user).await.unwrap();
    assert_eq!(details.total_active_connections, 0);

    // Expired keys no longer validate.
    assert!(db
        .extensions
        .validate_api_key(&new.api_key)
        .await
        .unwrap()
        .is_none());

    cleanup_user(&db, &user).await;
}
