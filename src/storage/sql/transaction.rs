//! Transactions and batches over a SQL namespace.
//!
//! Writes are buffered in memory and applied in one `BEGIN IMMEDIATE` ..
//! `COMMIT` block on commit, so nothing is visible to other readers before
//! then and a failed commit leaves the table untouched.
//!
//! On file databases a transaction also holds a read connection inside a
//! deferred `BEGIN`, so every read sees the data as it was when the
//! transaction was opened, whatever other handles or processes commit in the
//! meantime. In-memory databases cannot be shared with a second connection;
//! there, reads see the latest committed data of the owning handle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rusqlite::Connection;
use tracing::instrument;

use super::connection::{ConnectionRef, acquire_lock};
use super::dialect::{Dialect, StatementSet};
use super::error::backend_error;
use super::metrics::record_operation_metrics;
use super::storage::{delete_value, select_value, upsert_value};
use crate::storage::traits::{Batch, Reader, Transaction, Writer};
use crate::{Error, Result};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting reads and writes.
    Active,
    /// Writes were applied.
    Committed,
    /// Writes were thrown away.
    Discarded,
    /// Commit failed; only discard is allowed.
    Failed,
}

impl TransactionState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Discarded => "discarded",
            Self::Failed => "failed",
        }
    }
}

/// Pending writes: `Some` for a put, `None` for a delete.
type WriteBuffer = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// An isolated read-write transaction on one namespace.
///
/// Reads see the transaction's own writes first, then committed data (from
/// the snapshot, when there is one).
#[derive(Debug)]
pub struct SqlTransaction {
    dialect: Dialect,
    statements: Arc<StatementSet>,
    connection: ConnectionRef,
    snapshot: Mutex<Option<Connection>>,
    writes: Mutex<WriteBuffer>,
    state: TransactionState,
}

impl SqlTransaction {
    pub(super) fn new(
        dialect: Dialect,
        statements: Arc<StatementSet>,
        connection: ConnectionRef,
        snapshot: Option<Connection>,
    ) -> Self {
        Self {
            dialect,
            statements,
            connection,
            snapshot: Mutex::new(snapshot),
            writes: Mutex::new(BTreeMap::new()),
            state: TransactionState::Active,
        }
    }

    /// Returns `true` if reads come from a snapshot taken at open.
    pub fn has_snapshot(&self) -> bool {
        acquire_lock(&self.snapshot).is_some()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of distinct keys with a pending write.
    pub fn pending_writes(&self) -> usize {
        acquire_lock(&self.writes).len()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            other => Err(Error::TransactionFinished(other.as_str())),
        }
    }

    fn buffer(&self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        self.ensure_active()?;
        acquire_lock(&self.writes).insert(key.to_vec(), value.map(<[u8]>::to_vec));
        Ok(())
    }

    /// Ends the snapshot read transaction and closes its connection.
    fn release_snapshot(&mut self) {
        let snapshot = self
            .snapshot
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = snapshot
            && let Err((_, e)) = conn.close()
        {
            tracing::warn!(error = %e, "failed to close transaction snapshot connection");
        }
    }
}

/// Applies buffered writes in a single immediate transaction.
fn apply_writes(conn: &Connection, statements: &StatementSet, writes: &WriteBuffer) -> Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(backend_error("begin_transaction"))?;

    let result = writes.iter().try_for_each(|(key, value)| match value {
        Some(value) => upsert_value(conn, statements, key, value),
        None => delete_value(conn, statements, key),
    });

    if result.is_ok() {
        conn.execute_batch("COMMIT")
            .map_err(backend_error("commit_transaction"))
            .inspect_err(|_| rollback(conn))
    } else {
        rollback(conn);
        result
    }
}

/// Rolls back the open transaction on `conn`, reporting a failed rollback.
///
/// A connection whose rollback failed may still be inside the transaction,
/// and every later `BEGIN` on it will fail.
fn rollback(conn: &Connection) {
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        tracing::warn!(
            error = %e,
            in_transaction = !conn.is_autocommit(),
            "rollback failed"
        );
        metrics::counter!("sqlite_rollback_failures_total").increment(1);
    }
}

impl Reader for SqlTransaction {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.ensure_active()?;
        let pending = acquire_lock(&self.writes).get(key).cloned();
        match pending {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(Error::NotFound),
            None => {
                let snapshot = acquire_lock(&self.snapshot);
                match snapshot.as_ref() {
                    Some(conn) if self.connection.is_open() => {
                        select_value(conn, &self.statements, key)
                    },
                    Some(_) => Err(Error::Closed),
                    None => self
                        .connection
                        .with(|conn| select_value(conn, &self.statements, key)),
                }
            },
        }
    }
}

impl Writer for SqlTransaction {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.buffer(key, Some(value))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.buffer(key, None)
    }
}

impl Transaction for SqlTransaction {
    #[instrument(skip(self), fields(operation = "commit", backend = %self.dialect, table = %self.statements.table_name))]
    fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        let start = Instant::now();
        self.release_snapshot();
        let writes = std::mem::take(
            self.writes
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let result = self
            .connection
            .with(|conn| apply_writes(conn, &self.statements, &writes));
        record_operation_metrics(self.dialect.driver_name(), "commit", start, &result);

        self.state = if result.is_ok() {
            tracing::debug!(writes = writes.len(), "transaction committed");
            TransactionState::Committed
        } else {
            TransactionState::Failed
        };
        result
    }

    fn discard(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Active | TransactionState::Failed => {
                self.release_snapshot();
                self.writes
                    .get_mut()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
                self.state = TransactionState::Discarded;
                Ok(())
            },
            TransactionState::Committed | TransactionState::Discarded => Ok(()),
        }
    }
}

impl Drop for SqlTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            let pending = self
                .writes
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .len();
            if pending > 0 {
                tracing::debug!(pending, "transaction dropped without commit, writes discarded");
            }
        }
    }
}

/// Write-only batch applied atomically by [`Batch::write`].
#[derive(Debug)]
pub struct SqlBatch {
    transaction: SqlTransaction,
}

impl SqlBatch {
    pub(super) fn new(transaction: SqlTransaction) -> Self {
        Self { transaction }
    }

    /// Number of distinct keys with a pending write.
    pub fn len(&self) -> usize {
        self.transaction.pending_writes()
    }

    /// Returns `true` if nothing has been written to the batch.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Batch for SqlBatch {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.transaction.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.transaction.delete(key)
    }

    fn write(&mut self) -> Result<()> {
        self.transaction.commit()
    }
}
