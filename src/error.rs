//! Error types for the tail relay.

use std::time::Duration;
use thiserror::Error;

/// The main error type for tail relay operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when reading files or serving connections.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors when serializing a wire message.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line sink dropped its receiving end and can take no more batches.
    #[error("Line sink closed")]
    SinkClosed,

    /// A consumer rejected a message.
    #[error("Send failed: {reason}")]
    Send { reason: String },

    /// A consumer did not take a message within the send timeout.
    #[error("Send timed out after {timeout:?}")]
    SendTimeout { timeout: Duration },

    /// A consumer could not be accepted or failed its readiness handshake.
    #[error("Accept failed: {reason}")]
    Accept { reason: String },

    /// Configuration values that failed validation.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The HTTP listener could not bind.
    #[error("Bind error: {0}")]
    Bind(String),

    /// The HTTP server stopped with a fatal error.
    #[error("Serve error: {0}")]
    Serve(String),
}

/// A convenient Result type for tail relay operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_error = IoError::new(ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();

        match error {
            Error::Io(_) => {}
            _ => panic!("Expected Error::Io variant"),
        }

        assert!(error.to_string().contains("I/O error"));
        assert!(error.to_string().contains("File not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: Error = json_error.into();

        assert!(matches!(error, Error::Json(_)));
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_send_errors_display() {
        let error = Error::Send {
            reason: "connection reset".to_string(),
        };
        assert_eq!(error.to_string(), "Send failed: connection reset");

        let error = Error::SendTimeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(error.to_string(), "Send timed out after 250ms");
    }

    #[test]
    fn test_accept_error_display() {
        let error = Error::Accept {
            reason: "handshake refused".to_string(),
        };
        assert_eq!(error.to_string(), "Accept failed: handshake refused");
    }

    #[test]
    fn test_invalid_config_error() {
        let error = Error::InvalidConfig {
            message: "poll interval must be positive".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Invalid configuration: poll interval must be positive"
        );
    }

    #[test]
    fn test_sink_closed_error() {
        let error = Error::SinkClosed;
        assert_eq!(error.to_string(), "Line sink closed");
        assert_eq!(format!("{:?}", error), "SinkClosed");
    }

    #[test]
    fn test_error_chain_with_io_error() {
        let io_error = IoError::new(ErrorKind::PermissionDenied, "Access denied");
        let error: Error = io_error.into();

        match &error {
            Error::Io(inner) => {
                assert_eq!(inner.kind(), ErrorKind::PermissionDenied);
                assert_eq!(inner.to_string(), "Access denied");
            }
            _ => panic!("Expected Error::Io variant"),
        }
    }

    #[test]
    fn test_error_send_sync_traits() {
        // Errors cross task boundaries in the polling loop
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
