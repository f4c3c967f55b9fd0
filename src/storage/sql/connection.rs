//! Connection handling and the prepared-statement cache.
//!
//! Each owning [`SqlStorage`](super::SqlStorage) holds one `SQLite` connection
//! behind a mutex. Prepared statements live in the connection's own statement
//! cache (`prepare_cached`); [`prepare_all`] primes it when a namespace is
//! opened so a bad statement fails `open` rather than the first query. After a
//! reconnect the cache starts empty and is primed again.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::dialect::{Dialect, StatementSet};
use super::error::backend_error;
use super::pattern::like_match;
use crate::{Error, Result};

/// Default time to wait on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Prepared statements kept per connection.
///
/// Every namespace on a connection (the main one plus its temporaries) needs
/// seven slots; evicted statements are transparently re-prepared.
pub const STATEMENT_CACHE_CAPACITY: usize = 256;

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. This prevents cascading
/// failures when one operation panics.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Returns `true` for data sources that name a private in-memory database.
#[must_use]
pub fn is_in_memory(data_source: &str) -> bool {
    data_source.is_empty() || data_source == ":memory:"
}

/// Opens and configures a connection to `data_source`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedDriver`] for dialects without a connector in
/// this build, or [`Error::OperationFailed`] if the database cannot be opened.
pub fn open_connection(
    dialect: Dialect,
    data_source: &str,
    busy_timeout: Duration,
) -> Result<Connection> {
    if dialect != Dialect::Sqlite {
        return Err(Error::UnsupportedDriver(dialect.driver_name().to_string()));
    }

    let conn = if is_in_memory(data_source) {
        Connection::open_in_memory()
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Connection::open_with_flags(data_source, flags)
    }
    .map_err(backend_error("open_database"))?;

    configure_connection(&conn, busy_timeout)?;
    tracing::debug!(data_source, "opened SQLite connection");
    Ok(conn)
}

/// Configures a `SQLite` connection for concurrent use.
///
/// - **WAL mode** for concurrent readers alongside a writer (in-memory
///   databases keep their `memory` journal)
/// - **NORMAL synchronous** to balance durability with throughput
/// - **`busy_timeout`** so lock contention waits instead of failing at once
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    // In-memory databases refuse WAL and keep their own journal.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(busy_timeout)
        .map_err(backend_error("configure_connection"))?;
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    Ok(())
}

/// Replaces `like()` on this connection with a byte-wise matcher.
///
/// The built-in function reads its operands as UTF-8 text, so keys holding
/// NUL bytes or partial multi-byte sequences would be mis-matched. Must run
/// after `PRAGMA case_sensitive_like`, which re-registers the built-in.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the function cannot be registered.
pub fn register_binary_like(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    for n_arg in [2, 3] {
        conn.create_scalar_function("like", n_arg, flags, |ctx| {
            let pattern = ctx.get_raw(0);
            let subject = ctx.get_raw(1);
            if matches!(pattern, ValueRef::Null) || matches!(subject, ValueRef::Null) {
                return Ok(None);
            }
            let escape = if ctx.len() > 2 {
                match operand_bytes(ctx.get_raw(2))? {
                    [byte] => Some(*byte),
                    _ => {
                        return Err(rusqlite::Error::UserFunctionError(
                            "ESCAPE expression must be a single character".into(),
                        ));
                    },
                }
            } else {
                None
            };
            Ok(Some(like_match(
                operand_bytes(pattern)?,
                operand_bytes(subject)?,
                escape,
            )))
        })
        .map_err(backend_error("register_like"))?;
    }
    Ok(())
}

/// Raw bytes of a text or blob argument.
fn operand_bytes(value: ValueRef<'_>) -> rusqlite::Result<&[u8]> {
    value
        .as_bytes()
        .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
}

/// Prepares every point and prefix statement of a namespace.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] for the first statement that fails.
pub fn prepare_all(conn: &Connection, statements: &StatementSet) -> Result<()> {
    for sql in statements.preparable() {
        conn.prepare_cached(sql)
            .map_err(backend_error("prepare_statement"))?;
    }
    Ok(())
}

/// Creates a namespace's table if needed and readies the connection for it.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if DDL, the pragma or preparation fails.
pub fn setup_namespace(conn: &Connection, statements: &StatementSet) -> Result<()> {
    conn.execute_batch(&statements.create_table)
        .map_err(backend_error("create_table"))?;
    prepare_namespace(conn, statements)
}

/// Creates a namespace that must not exist yet and readies the connection for it.
///
/// Returns `Ok(false)`, leaving the existing table untouched, if the name is
/// already taken.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if DDL, the pragma or preparation fails
/// for any other reason.
pub fn setup_fresh_namespace(conn: &Connection, statements: &StatementSet) -> Result<bool> {
    match conn.execute_batch(&statements.create_fresh_table) {
        Ok(()) => {},
        Err(e) if is_table_exists(&e) => return Ok(false),
        Err(e) => return Err(backend_error("create_table")(e)),
    }
    prepare_namespace(conn, statements)?;
    Ok(true)
}

fn is_table_exists(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.contains("already exists")
    )
}

/// Opens a read connection pinned to the database's current committed state.
///
/// Returns `None` for in-memory databases, which cannot be shared with a
/// second connection.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the connection or its read
/// transaction cannot be started.
pub fn open_snapshot(
    dialect: Dialect,
    data_source: &str,
    busy_timeout: Duration,
) -> Result<Option<Connection>> {
    if is_in_memory(data_source) {
        return Ok(None);
    }
    let conn = open_connection(dialect, data_source, busy_timeout)?;
    // WAL fixes the snapshot at the first read, not at BEGIN.
    conn.execute_batch("BEGIN DEFERRED")
        .map_err(backend_error("begin_snapshot"))?;
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(backend_error("begin_snapshot"))?;
    Ok(Some(conn))
}

fn prepare_namespace(conn: &Connection, statements: &StatementSet) -> Result<()> {
    if let Some(pragma) = &statements.pragma {
        conn.execute_batch(pragma)
            .map_err(backend_error("case_sensitivity_pragma"))?;
    }
    register_binary_like(conn)?;
    prepare_all(conn, statements)
}

/// A connection slot that can be closed and reopened.
#[derive(Debug, Default)]
pub struct SharedConnection {
    conn: Mutex<Option<Connection>>,
}

impl SharedConnection {
    /// Creates an empty (closed) slot.
    #[must_use]
    pub const fn closed() -> Self {
        Self {
            conn: Mutex::new(None),
        }
    }

    /// Connects through `connect` unless a connection is already present.
    ///
    /// # Errors
    ///
    /// Propagates the error from `connect`.
    pub fn ensure_open(&self, connect: impl FnOnce() -> Result<Connection>) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        if guard.is_none() {
            *guard = Some(connect()?);
        }
        Ok(())
    }

    /// Returns `true` while a connection is present.
    pub fn is_open(&self) -> bool {
        acquire_lock(&self.conn).is_some()
    }

    /// Runs `f` with the connection held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if there is no connection, else `f`'s error.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = acquire_lock(&self.conn);
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }

    /// Closes the connection. Closing an empty slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if `SQLite` refuses to close.
    pub fn close(&self) -> Result<()> {
        let taken = acquire_lock(&self.conn).take();
        match taken {
            Some(conn) => conn.close().map_err(|(_, e)| backend_error("close")(e)),
            None => Ok(()),
        }
    }
}

/// How a handle reaches its connection.
///
/// Temporary namespaces borrow their parent's connection without keeping it
/// alive: once the parent is closed or dropped, they fail with
/// [`Error::Closed`].
#[derive(Debug, Clone)]
pub enum ConnectionRef {
    /// The handle owns the connection.
    Owned(Arc<SharedConnection>),
    /// The handle uses a connection owned by another handle.
    Borrowed(Weak<SharedConnection>),
}

impl ConnectionRef {
    /// Returns a non-owning reference to the same connection.
    #[must_use]
    pub fn downgrade(&self) -> Self {
        match self {
            Self::Owned(shared) => Self::Borrowed(Arc::downgrade(shared)),
            Self::Borrowed(weak) => Self::Borrowed(weak.clone()),
        }
    }

    /// Returns `true` if this reference owns the connection.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Returns `true` if the connection exists and is open.
    pub fn is_open(&self) -> bool {
        match self {
            Self::Owned(shared) => shared.is_open(),
            Self::Borrowed(weak) => weak.upgrade().is_some_and(|shared| shared.is_open()),
        }
    }

    /// Runs `f` with the connection held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the connection is closed or its owner is
    /// gone, else `f`'s error.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match self {
            Self::Owned(shared) => shared.with(f),
            Self::Borrowed(weak) => weak.upgrade().ok_or(Error::Closed)?.with(f),
        }
    }
}
