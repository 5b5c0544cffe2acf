//! Unified error type for calculations, persistence backends and settings.
//!
//! Every fallible function in the crate returns [`Result`]. Errors are grouped into
//! an [`ErrorKind`] so the UI-action boundary can decide how to surface them
//! (see [`crate::notice`]).

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-numeric or out-of-range user entry
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// A room's meter readings are negative or go backwards
    #[error("Invalid reading for {room}: present {present}, previous {previous}")]
    InvalidReading {
        /// Room the readings belong to
        room: String,
        /// Present meter reading
        present: i64,
        /// Previous meter reading
        previous: i64,
    },

    /// Total difference units summed to zero
    #[error("Total difference units is zero, per unit cost cannot be calculated")]
    DivisionByZero,

    /// Requested record does not exist
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing record
        what: String,
    },

    /// Destination file is open elsewhere or not writable
    #[error("File is locked or not writable: {}", path.display())]
    FileLocked {
        /// The file that could not be written
        path: PathBuf,
    },

    /// The remote table store answered with a non-success status
    #[error("Remote store error ({status}): {message}")]
    RemoteApi {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Remote credentials are missing
    #[error("Remote store is not configured")]
    RemoteNotConfigured,

    /// A background fetch is already outstanding
    #[error("A fetch is already in progress")]
    Busy,

    /// Configuration file or environment problem
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Settings encryption or decryption failed
    #[error("Encryption error: {message}")]
    Crypto {
        /// What went wrong
        message: String,
    },

    /// `SeaORM` / `SQLite` failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// CSV read or write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport failure talking to the remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used when presenting errors to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user entry; input is kept for correction
    InvalidInput,
    /// Zero total difference
    DivisionByZero,
    /// File lock, disk, database or network failure
    Persistence,
    /// Record absent; informational
    NotFound,
    /// Configuration, key material or re-entrancy problems
    Internal,
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Classifies the error for the UI-action boundary.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } | Self::InvalidReading { .. } => ErrorKind::InvalidInput,
            Self::DivisionByZero => ErrorKind::DivisionByZero,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::FileLocked { .. }
            | Self::RemoteApi { .. }
            | Self::RemoteNotConfigured
            | Self::Database(_)
            | Self::Csv(_)
            | Self::Http(_)
            | Self::Json(_)
            | Self::Io(_) => ErrorKind::Persistence,
            Self::Busy | Self::Config { .. } | Self::Crypto { .. } => ErrorKind::Internal,
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_errors_classify_as_invalid_input() {
        let err = Error::InvalidReading {
            room: "Room 1".to_string(),
            present: 10,
            previous: 20,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            err.to_string(),
            "Invalid reading for Room 1: present 10, previous 20"
        );
    }

    #[test]
    fn test_storage_errors_classify_as_persistence() {
        let err = Error::FileLocked {
            path: PathBuf::from("history.csv"),
        };
        assert_eq!(err.kind(), ErrorKind::Persistence);

        let err = Error::from(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_not_found_is_informational() {
        let err = Error::not_found("Calculation for June 2025");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Calculation for June 2025 not found");
    }
}
