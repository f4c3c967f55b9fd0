//! SQL database backend.
//!
//! Stores each namespace as a two-column table (`key`, `value`, both binary,
//! `key` primary) and answers prefix queries with `LIKE` over escaped keys.
//!
//! # Module Structure
//!
//! - [`dialect`]: Per-dialect SQL text and table-name validation
//! - [`pattern`]: `LIKE` escaping and the byte-wise matcher
//! - [`connection`]: Connection setup and the statement cache
//! - [`error`]: Driver error mapping
//! - [`temporary`]: Names for temporary namespaces
//!
//! # Example
//!
//! ```
//! use sqlkv::storage::sql::new_open_db;
//! use sqlkv::storage::{PrefixReader, Writer};
//!
//! let storage = new_open_db("sqlite3", ":memory:", "packages")?;
//! storage.put(b"pkg/b", b"2")?;
//! storage.put(b"pkg/a", b"1")?;
//! assert_eq!(storage.keys_by_prefix(b"pkg/")?, vec![b"pkg/a".to_vec(), b"pkg/b".to_vec()]);
//! # Ok::<(), sqlkv::Error>(())
//! ```

pub mod connection;
pub mod dialect;
pub mod error;
mod metrics;
pub mod pattern;
mod storage;
pub mod temporary;
mod transaction;

use std::path::Path;

pub use dialect::{Dialect, MAX_TABLE_NAME_LEN, StatementSet, validate_table_name};
pub use pattern::{escape_like_wildcards, like_match, prefix_pattern};
pub use storage::SqlStorage;
pub use transaction::{SqlBatch, SqlTransaction, TransactionState};

use crate::Result;
use crate::config::StorageConfig;
use crate::storage::traits::Storage;

/// Creates an unopened storage handle for `table_name`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] for an unknown driver or an invalid
/// table name.
pub fn new_db(driver: &str, data_source: &str, table_name: &str) -> Result<SqlStorage> {
    let config = StorageConfig::default()
        .with_driver(driver)
        .with_data_source(data_source)
        .with_table_name(table_name);
    SqlStorage::new(&config)
}

/// Creates a storage handle and opens it.
///
/// # Errors
///
/// Returns an error if the handle cannot be created or opened.
pub fn new_open_db(driver: &str, data_source: &str, table_name: &str) -> Result<SqlStorage> {
    let storage = new_db(driver, data_source, table_name)?;
    storage.open()?;
    Ok(storage)
}

/// Recovery entry point kept for parity with file-based backends.
///
/// SQL databases recover through their own journal, so this only logs.
///
/// # Errors
///
/// Never fails.
pub fn recover_db(path: impl AsRef<Path>) -> Result<()> {
    tracing::info!(
        path = %path.as_ref().display(),
        "SQL databases recover through their own journal; nothing to do"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::storage::traits::Reader;

    #[test]
    fn test_new_db_is_unopened() {
        let storage = new_db("sqlite3", ":memory:", "kv").unwrap();
        assert!(!storage.is_open());
        assert!(matches!(storage.get(b"k"), Err(Error::Closed)));
    }

    #[test]
    fn test_new_open_db() {
        let storage = new_open_db("sqlite", "", "packages").unwrap();
        assert!(storage.is_open());
        assert_eq!(storage.table_name(), "packages");
        assert_eq!(storage.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn test_new_open_db_rejects_unknown_driver() {
        assert!(matches!(
            new_open_db("postgres", ":memory:", "kv"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_recover_db_is_noop() {
        recover_db("/nonexistent/path.db").unwrap();
    }
}
