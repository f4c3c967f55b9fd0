//! Key-value storage contract.
//!
//! The storage layer exposes a LevelDB-shaped surface: byte-string keys and
//! values, point operations, ordered prefix scans, batches, transactions and
//! disposable temporary namespaces.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Prefix Scans |
//! |---------|----------|--------------|
//! | `SqlStorage` (`SQLite`) | Embedded, single file or in-memory | Escaped `LIKE`, binary-exact |
//! | `SqlStorage` (`MySQL`) | Statement generation only in this build | `LIKE` over `VARBINARY` |
//!
//! # Ordering Guarantee
//!
//! Every prefix operation returns rows in ascending lexicographic order of the
//! raw key bytes. Collections built on top rely on this, so implementations
//! must sort rather than return rows in storage order.
//!
//! # Error Modes
//!
//! | Error | Meaning |
//! |-------|---------|
//! | `Error::NotFound` | `get` found no row for the key |
//! | `Error::Closed` | The handle (or its parent connection) was closed |
//! | `Error::OperationFailed` | Backend failure; nothing is retried internally |
//! | `Error::Processor` | The `process_by_prefix` callback stopped the scan |

use crate::Result;

use super::transaction::{Batch, Transaction};

/// Point reads.
pub trait Reader {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

/// Point writes.
pub trait Writer {
    /// Stores `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// Ordered prefix enumeration.
///
/// An empty prefix matches every key in the namespace.
pub trait PrefixReader {
    /// Returns `true` if at least one key starts with `prefix`.
    fn has_prefix(&self, prefix: &[u8]) -> Result<bool>;

    /// Returns the values of all keys starting with `prefix`, in key order.
    fn fetch_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Returns all keys starting with `prefix`, in ascending order.
    fn keys_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Calls `processor` with each matching key and value, in key order.
    ///
    /// The first error returned by `processor` stops the scan and is
    /// returned unchanged.
    fn process_by_prefix<F>(&self, prefix: &[u8], processor: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>;
}

/// A complete key-value namespace with lifecycle management.
///
/// # Implementor Notes
///
/// - Methods use `&self` so a handle can be shared across threads
/// - `close` must be idempotent; other operations on a closed handle fail with
///   [`crate::Error::Closed`]
/// - `create_temporary` returns a handle over a fresh, empty namespace
pub trait Storage: Reader + Writer + PrefixReader + Send + Sync {
    /// Batch type produced by [`Storage::create_batch`].
    type Batch: Batch;
    /// Transaction type produced by [`Storage::open_transaction`].
    type Transaction: Transaction;

    /// Opens (or reopens) the namespace, creating its table if missing.
    fn open(&self) -> Result<()>;

    /// Releases the connection. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Starts a write batch.
    fn create_batch(&self) -> Result<Self::Batch>;

    /// Starts an isolated transaction.
    fn open_transaction(&self) -> Result<Self::Transaction>;

    /// Creates a new, empty namespace alongside this one.
    fn create_temporary(&self) -> Result<Self>
    where
        Self: Sized;

    /// Compacts the underlying store, where the backend supports it.
    fn compact_db(&self) -> Result<()>;

    /// Removes the namespace and all of its data.
    fn drop_db(&self) -> Result<()>;
}
