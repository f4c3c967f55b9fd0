//! SQL-backed storage handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rusqlite::{Connection, params};
use tracing::instrument;

use super::connection::{
    ConnectionRef, SharedConnection, open_connection, open_snapshot, setup_fresh_namespace,
    setup_namespace,
};
use super::dialect::{Dialect, StatementSet};
use super::error::{backend_error, query_error};
use super::metrics::record_operation_metrics;
use super::pattern::prefix_pattern;
use super::temporary::temporary_table_ids;
use super::transaction::{SqlBatch, SqlTransaction};
use crate::config::StorageConfig;
use crate::storage::traits::{PrefixReader, Reader, Storage, Writer};
use crate::{Error, Result};

/// Key-value storage over one table of a SQL database.
///
/// # Concurrency Model
///
/// The handle is `Send + Sync`. All statements run on a single connection
/// behind a mutex because `rusqlite::Connection` is not `Sync`; `SQLite`'s WAL
/// mode and `busy_timeout` cover other processes using the same file.
///
/// # Namespaces
///
/// Handles created through [`Storage::create_temporary`] use their own table
/// on the parent's connection without keeping it alive. Closing the parent
/// makes them fail with [`Error::Closed`]; closing a temporary only closes
/// the temporary.
#[derive(Debug)]
pub struct SqlStorage {
    dialect: Dialect,
    data_source: String,
    busy_timeout: Duration,
    statements: Arc<StatementSet>,
    connection: ConnectionRef,
    closed: AtomicBool,
}

impl SqlStorage {
    /// Creates an unopened handle. No connection is made until [`Storage::open`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown driver or a table name
    /// that is not a plain identifier.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let dialect = Dialect::from_driver(&config.driver)?;
        let statements = StatementSet::generate(dialect, &config.table_name)?;
        Ok(Self {
            dialect,
            data_source: config.data_source.clone(),
            busy_timeout: config.busy_timeout(),
            statements: Arc::new(statements),
            connection: ConnectionRef::Owned(Arc::new(SharedConnection::closed())),
            closed: AtomicBool::new(true),
        })
    }

    /// Creates and opens a handle from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlkv::{SqlStorage, StorageConfig};
    /// use sqlkv::storage::{Reader, Writer};
    ///
    /// let storage = SqlStorage::from_config(&StorageConfig::default())?;
    /// storage.put(b"greeting", b"hello")?;
    /// assert_eq!(storage.get(b"greeting")?, b"hello");
    /// # Ok::<(), sqlkv::Error>(())
    /// ```
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let storage = Self::new(config)?;
        storage.open()?;
        Ok(storage)
    }

    /// Returns the dialect this handle generates SQL for.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Returns the unquoted name of the backing table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.statements.table_name
    }

    /// Returns the data source the handle connects to.
    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Returns `true` if operations can currently reach the database.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.connection.is_open()
    }

    /// Runs `f` on the connection and records metrics for `operation`.
    fn run<T>(&self, operation: &'static str, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let result = if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            self.connection.with(f)
        };
        record_operation_metrics(self.dialect.driver_name(), operation, start, &result);
        result
    }

    fn drop_table_transiently(&self) -> Result<()> {
        let conn = open_connection(self.dialect, &self.data_source, self.busy_timeout)?;
        conn.execute_batch(&self.statements.drop_table)
            .map_err(backend_error("drop_table"))?;
        conn.close().map_err(|(_, e)| backend_error("close")(e))
    }
}

/// Looks up the value stored under `key`.
pub(super) fn select_value(conn: &Connection, statements: &StatementSet, key: &[u8]) -> Result<Vec<u8>> {
    let mut stmt = conn
        .prepare_cached(&statements.get)
        .map_err(backend_error("get"))?;
    stmt.query_row([key], |row| row.get(0))
        .map_err(query_error("get"))
}

/// Inserts or replaces the record for `key`.
pub(super) fn upsert_value(
    conn: &Connection,
    statements: &StatementSet,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    let mut stmt = conn
        .prepare_cached(&statements.put)
        .map_err(backend_error("put"))?;
    stmt.execute(params![key, value])
        .map_err(backend_error("put"))?;
    Ok(())
}

/// Removes the record for `key` if there is one.
pub(super) fn delete_value(conn: &Connection, statements: &StatementSet, key: &[u8]) -> Result<()> {
    let mut stmt = conn
        .prepare_cached(&statements.delete)
        .map_err(backend_error("delete"))?;
    stmt.execute([key]).map_err(backend_error("delete"))?;
    Ok(())
}

impl Reader for SqlStorage {
    #[instrument(skip(self, key), fields(operation = "get", backend = %self.dialect, table = %self.statements.table_name, key_len = key.len()))]
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.run("get", |conn| select_value(conn, &self.statements, key))
    }
}

impl Writer for SqlStorage {
    #[instrument(skip(self, key, value), fields(operation = "put", backend = %self.dialect, table = %self.statements.table_name, key_len = key.len(), value_len = value.len()))]
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.run("put", |conn| upsert_value(conn, &self.statements, key, value))
    }

    #[instrument(skip(self, key), fields(operation = "delete", backend = %self.dialect, table = %self.statements.table_name, key_len = key.len()))]
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.run("delete", |conn| delete_value(conn, &self.statements, key))
    }
}

impl PrefixReader for SqlStorage {
    #[instrument(skip(self, prefix), fields(operation = "has_prefix", backend = %self.dialect, table = %self.statements.table_name, prefix_len = prefix.len()))]
    fn has_prefix(&self, prefix: &[u8]) -> Result<bool> {
        let pattern = prefix_pattern(prefix, self.dialect.escape_char());
        self.run("has_prefix", |conn| {
            let mut stmt = conn
                .prepare_cached(&self.statements.count_prefix)
                .map_err(backend_error("has_prefix"))?;
            let count: i64 = stmt
                .query_row([pattern.as_slice()], |row| row.get(0))
                .map_err(backend_error("has_prefix"))?;
            Ok(count > 0)
        })
    }

    #[instrument(skip(self, prefix), fields(operation = "fetch_by_prefix", backend = %self.dialect, table = %self.statements.table_name, prefix_len = prefix.len()))]
    fn fetch_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let pattern = prefix_pattern(prefix, self.dialect.escape_char());
        self.run("fetch_by_prefix", |conn| {
            let mut stmt = conn
                .prepare_cached(&self.statements.fetch_prefix)
                .map_err(backend_error("fetch_by_prefix"))?;
            let rows = stmt
                .query_map([pattern.as_slice()], |row| row.get(0))
                .map_err(backend_error("fetch_by_prefix"))?;
            rows.collect::<rusqlite::Result<Vec<Vec<u8>>>>()
                .map_err(backend_error("fetch_by_prefix"))
        })
    }

    #[instrument(skip(self, prefix), fields(operation = "keys_by_prefix", backend = %self.dialect, table = %self.statements.table_name, prefix_len = prefix.len()))]
    fn keys_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let pattern = prefix_pattern(prefix, self.dialect.escape_char());
        self.run("keys_by_prefix", |conn| {
            let mut stmt = conn
                .prepare_cached(&self.statements.keys_prefix)
                .map_err(backend_error("keys_by_prefix"))?;
            let rows = stmt
                .query_map([pattern.as_slice()], |row| row.get(0))
                .map_err(backend_error("keys_by_prefix"))?;
            rows.collect::<rusqlite::Result<Vec<Vec<u8>>>>()
                .map_err(backend_error("keys_by_prefix"))
        })
    }

    #[instrument(skip(self, prefix, processor), fields(operation = "process_by_prefix", backend = %self.dialect, table = %self.statements.table_name, prefix_len = prefix.len()))]
    fn process_by_prefix<F>(&self, prefix: &[u8], mut processor: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<()>,
    {
        let pattern = prefix_pattern(prefix, self.dialect.escape_char());
        // Rows are collected first so the connection is free while the processor runs.
        let pairs = self.run("process_by_prefix", |conn| {
            let mut stmt = conn
                .prepare_cached(&self.statements.process_prefix)
                .map_err(backend_error("process_by_prefix"))?;
            let rows = stmt
                .query_map([pattern.as_slice()], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(backend_error("process_by_prefix"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(backend_error("process_by_prefix"))
        })?;

        for (key, value) in &pairs {
            processor(key, value)?;
        }
        Ok(())
    }
}

impl Storage for SqlStorage {
    type Batch = SqlBatch;
    type Transaction = SqlTransaction;

    #[instrument(skip(self), fields(operation = "open", backend = %self.dialect, table = %self.statements.table_name))]
    fn open(&self) -> Result<()> {
        let start = Instant::now();
        let result: Result<()> = (|| {
            if let ConnectionRef::Owned(shared) = &self.connection {
                shared.ensure_open(|| {
                    open_connection(self.dialect, &self.data_source, self.busy_timeout)
                })?;
            }
            self.connection
                .with(|conn| setup_namespace(conn, &self.statements))?;
            self.closed.store(false, Ordering::Release);
            Ok(())
        })();

        record_operation_metrics(self.dialect.driver_name(), "open", start, &result);
        if result.is_ok() {
            tracing::debug!(data_source = %self.data_source, "storage opened");
        }
        result
    }

    #[instrument(skip(self), fields(operation = "close", backend = %self.dialect, table = %self.statements.table_name))]
    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if let ConnectionRef::Owned(shared) = &self.connection {
            shared.close()?;
        }
        tracing::debug!("storage closed");
        Ok(())
    }

    fn create_batch(&self) -> Result<SqlBatch> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        Ok(SqlBatch::new(SqlTransaction::new(
            self.dialect,
            Arc::clone(&self.statements),
            self.connection.clone(),
            None,
        )))
    }

    #[instrument(skip(self), fields(operation = "open_transaction", backend = %self.dialect, table = %self.statements.table_name))]
    fn open_transaction(&self) -> Result<SqlTransaction> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        let snapshot = open_snapshot(self.dialect, &self.data_source, self.busy_timeout)?;
        Ok(SqlTransaction::new(
            self.dialect,
            Arc::clone(&self.statements),
            self.connection.clone(),
            snapshot,
        ))
    }

    #[instrument(skip(self), fields(operation = "create_temporary", backend = %self.dialect, table = %self.statements.table_name))]
    fn create_temporary(&self) -> Result<Self> {
        let statements = self.run("create_temporary", |conn| {
            // Names left behind by an earlier process are skipped, never reused.
            loop {
                let table_name =
                    temporary_table_ids().next_table_name(&self.statements.table_name);
                let statements = StatementSet::generate(self.dialect, &table_name)?;
                if setup_fresh_namespace(conn, &statements)? {
                    return Ok(statements);
                }
                tracing::debug!(table = %table_name, "temporary table name taken, skipping");
            }
        })?;

        tracing::debug!(temporary = %statements.table_name, "temporary namespace created");
        Ok(Self {
            dialect: self.dialect,
            data_source: self.data_source.clone(),
            busy_timeout: self.busy_timeout,
            statements: Arc::new(statements),
            connection: self.connection.downgrade(),
            closed: AtomicBool::new(false),
        })
    }

    fn compact_db(&self) -> Result<()> {
        tracing::info!(
            backend = %self.dialect,
            table = %self.statements.table_name,
            "compaction is left to the database engine"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(operation = "drop_db", backend = %self.dialect, table = %self.statements.table_name))]
    fn drop_db(&self) -> Result<()> {
        let start = Instant::now();
        // A live connection is used even when only this handle was closed, so
        // temporaries in an in-memory database drop the right table.
        let result = match self.connection.with(|conn| {
            conn.execute_batch(&self.statements.drop_table)
                .map_err(backend_error("drop_table"))
        }) {
            Err(Error::Closed) => self.drop_table_transiently(),
            other => other,
        };

        record_operation_metrics(self.dialect.driver_name(), "drop_db", start, &result);
        if result.is_ok() {
            tracing::debug!("table dropped");
        }
        result
    }
}
