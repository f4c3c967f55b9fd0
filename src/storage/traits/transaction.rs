//! Transaction and batch contracts.
//!
//! Both are scoped write contexts whose writes reach the database together,
//! in one native transaction, when they are committed:
//!
//! ```text
//! active ──commit──▶ committed
//!    │  └─commit fails─▶ failed ──discard──▶ discarded
//!    └──discard────▶ discarded
//! ```
//!
//! Reads and writes are only legal while `active`. `discard` after a
//! successful `commit` is a no-op, so callers may discard unconditionally
//! on their way out.

use crate::Result;

use super::storage::{Reader, Writer};

/// An isolated read-write transaction.
///
/// Writes are invisible outside the transaction until [`Transaction::commit`].
/// Reads see the transaction's own writes first. Backends that can hold a
/// second connection serve the rest from a snapshot taken when the
/// transaction was opened; others read the latest committed data.
/// Transactions deliberately offer no prefix scans.
pub trait Transaction: Reader + Writer {
    /// Applies all writes atomically.
    ///
    /// A failed commit leaves the transaction unusable for further writes.
    fn commit(&mut self) -> Result<()>;

    /// Rolls back all writes. Safe to call after `commit`.
    fn discard(&mut self) -> Result<()>;
}

/// A write-only batch applied atomically by [`Batch::write`].
pub trait Batch {
    /// Queues a put.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Queues a delete.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Applies every queued operation at once.
    fn write(&mut self) -> Result<()>;
}
