//! Error types for cortex.

use thiserror::Error;

/// Result type alias using cortex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cortex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content item not found
    #[error("Content not found: {0}")]
    ContentNotFound(uuid::Uuid),

    /// Tag not found
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Extension connection not found
    #[error("Connection not found: {0}")]
    ConnectionNotFound(uuid::Uuid),

    /// Connection ceiling reached
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Duplicate resource (e.g. device fingerprint already paired)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_content_not_found() {
        let id = Uuid::nil();
        let err = Error::ContentNotFound(id);
        assert_eq!(err.to_string(), format!("Content not found: {}", id));
    }

    #[test]
    fn test_error_display_tag_not_found() {
        let err = Error::TagNotFound("rust-lang".to_string());
        assert_eq!(err.to_string(), "Tag not found: rust-lang");
    }

    #[test]
    fn test_error_display_capacity() {
        let err = Error::CapacityExceeded("connection limit reached".to_string());
        assert_eq!(
            err.to_string(),
            "Capacity exceeded: connection limit reached"
        );
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("device already connected".to_string());
        assert_eq!(err.to_string(), "Conflict: device already connected");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("negative count".to_string());
        assert_eq!(err.to_string(), "Invalid input: negative count");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("invalid API key".to_string());
        assert_eq!(err.to_string(), "Unauthorized: invalid API key");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_connection_not_found_with_random_uuid() {
        let id = Uuid::new_v4();
        let err = Error::ConnectionNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
