//! Error types for pulse.
//!
//! This module defines the error type shared by the registration, scanning,
//! storage and export layers. Rejected scans are not errors: they are
//! reported as [`crate::checkin::ScanOutcome`] values.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pulse operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Registration Errors ===
    /// A required form field was left empty.
    #[error("please complete all required fields: {field} is missing")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The QR image could not be generated.
    #[error("failed to generate QR code: {0}")]
    QrGenerate(String),

    // === Scanning Errors ===
    /// A scan source could not be acquired, or gave up while running.
    #[error("scan source '{name}' is unavailable: {message}")]
    ScanSourceUnavailable {
        /// Name of the scan source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// The scan source is already running.
    #[error("scan source '{name}' is already running")]
    ScanSourceBusy {
        /// Name of the scan source.
        name: &'static str,
    },

    /// A scanned payload could not be decoded into an identity.
    #[error("invalid QR format: {reason}")]
    MalformedPayload {
        /// Why the payload was rejected.
        reason: String,
    },

    // === Roster Errors ===
    /// A bib confirmation was attempted with an empty bib.
    #[error("bib number cannot be empty")]
    EmptyBib,

    /// The license already has an active roster entry.
    #[error("license {license} is already signed in")]
    AlreadyActive {
        /// The duplicated license value.
        license: String,
    },

    /// No roster entry carries the given license.
    #[error("no roster entry for license {license}")]
    EntryNotFound {
        /// The license that was looked up.
        license: String,
    },

    /// The access code did not match.
    #[error("access denied: incorrect code for {action}")]
    AccessDenied {
        /// The guarded action that was refused.
        action: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for pulse operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a malformed payload error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    /// Create a scan source acquisition error.
    #[must_use]
    pub fn source_unavailable(name: &'static str, message: impl Into<String>) -> Self {
        Self::ScanSourceUnavailable {
            name,
            message: message.into(),
        }
    }

    /// Check if this error came from a payload that failed to decode.
    #[must_use]
    pub fn is_malformed_payload(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }

    /// Check if this error is an access-gate refusal.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = Error::MissingField { field: "name" };
        assert_eq!(
            err.to_string(),
            "please complete all required fields: name is missing"
        );
    }

    #[test]
    fn test_malformed_payload() {
        let err = Error::malformed("not base64");
        assert!(err.is_malformed_payload());
        assert_eq!(err.to_string(), "invalid QR format: not base64");
        assert!(!Error::EmptyBib.is_malformed_payload());
    }

    #[test]
    fn test_access_denied() {
        let err = Error::AccessDenied {
            action: "roster reset".to_string(),
        };
        assert!(err.is_access_denied());
        assert!(err.to_string().contains("roster reset"));
    }

    #[test]
    fn test_source_unavailable_display() {
        let err = Error::source_unavailable("decoder", "zbarcam: not found");
        let msg = err.to_string();
        assert!(msg.contains("decoder"));
        assert!(msg.contains("zbarcam: not found"));
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_already_active_display() {
        let err = Error::AlreadyActive {
            license: "L1".to_string(),
        };
        assert_eq!(err.to_string(), "license L1 is already signed in");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/roster.db",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
