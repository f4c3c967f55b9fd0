//! # sqlkv
//!
//! Ordered byte-string key-value storage on top of a relational database.
//!
//! `sqlkv` makes an SQL table behave like a LevelDB-style store: byte-string
//! keys and values, point reads and writes, prefix scans in ascending key
//! order, batches, transactions and disposable temporary namespaces. Code
//! written against the [`Storage`] contract runs unchanged on either a native
//! key-value engine or an SQL backend.
//!
//! ## Features
//!
//! - One table per namespace (`key` primary key, `value` blob)
//! - Binary-exact prefix matching through escaped `LIKE` patterns
//! - Per-dialect statement generation (`SQLite`, `MySQL`)
//! - Isolated transactions that buffer writes until commit
//! - Temporary namespaces that share the parent's connection
//!
//! ## Example
//!
//! ```rust
//! use sqlkv::storage::sql::new_open_db;
//! use sqlkv::{Reader, Writer};
//!
//! let db = new_open_db("sqlite3", ":memory:", "packages")?;
//! db.put(b"key", b"value")?;
//! assert_eq!(db.get(b"key")?, b"value");
//! db.delete(b"key")?;
//! assert!(db.get(b"key").unwrap_err().is_not_found());
//! # Ok::<(), sqlkv::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use config::{SqlkvConfig, StorageConfig};
pub use storage::sql::{Dialect, SqlBatch, SqlStorage, SqlTransaction};
pub use storage::{Batch, PrefixReader, Reader, Storage, Transaction, Writer};

/// Error type for sqlkv operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | `get` on a key that has no row, inside or outside a transaction |
/// | `InvalidInput` | Unknown driver name, table name that is not a plain identifier |
/// | `OperationFailed` | Any backend failure: connect, DDL, query, commit, rollback |
/// | `Closed` | Operation on a closed handle, or on a temporary whose parent is gone |
/// | `TransactionFinished` | Read or write on a committed, discarded or failed transaction |
/// | `UnsupportedDriver` | Driver is known but this build carries no connector for it |
/// | `Processor` | A `process_by_prefix` callback returned its own error |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The requested key does not exist.
    #[error("key not found")]
    NotFound,

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - The driver name is not recognized
    /// - A table name contains characters other than ASCII alphanumerics and `_`
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A backend operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The storage handle (or the connection it borrows) is closed.
    #[error("storage is closed")]
    Closed,

    /// The transaction has already reached a terminal state.
    #[error("transaction already {0}")]
    TransactionFinished(&'static str),

    /// The driver is recognized but has no connector in this build.
    #[error("driver '{0}' is not available in this build")]
    UnsupportedDriver(String),

    /// Error returned by a caller-supplied prefix processor, passed through unchanged.
    #[error(transparent)]
    Processor(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a caller error so it can be returned from a prefix processor.
    pub fn processor(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Processor(err.into())
    }

    /// Returns `true` if this error signals a missing key.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type alias for sqlkv operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::NotFound.to_string(), "key not found");

        let err = Error::InvalidInput("bad table".to_string());
        assert_eq!(err.to_string(), "invalid input: bad table");

        let err = Error::OperationFailed {
            operation: "get".to_string(),
            cause: "disk I/O error".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'get' failed: disk I/O error");

        assert_eq!(
            Error::TransactionFinished("committed").to_string(),
            "transaction already committed"
        );
        assert_eq!(
            Error::UnsupportedDriver("mysql".to_string()).to_string(),
            "driver 'mysql' is not available in this build"
        );
    }

    #[test]
    fn test_processor_error_is_transparent() {
        let err = Error::processor("stop here");
        assert_eq!(err.to_string(), "stop here");
        assert!(!err.is_not_found());
        assert!(Error::NotFound.is_not_found());
    }
}
