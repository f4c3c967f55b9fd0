//! SQL dialects and per-namespace statement generation.
//!
//! Each namespace gets one [`StatementSet`], generated once from its table
//! name and dialect and never modified afterwards. Only the prepared form
//! (owned by the connection's statement cache) is rebuilt after a reconnect.

use std::fmt;

use crate::{Error, Result};

/// Longest accepted table name (`MySQL`'s identifier limit).
pub const MAX_TABLE_NAME_LEN: usize = 64;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `SQLite` (driver names `sqlite3`, `sqlite`).
    Sqlite,
    /// `MySQL` / `MariaDB` (driver name `mysql`).
    MySql,
}

impl Dialect {
    /// Resolves a driver name to its dialect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown driver names.
    pub fn from_driver(driver: &str) -> Result<Self> {
        match driver.to_lowercase().as_str() {
            "sqlite3" | "sqlite" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(Error::InvalidInput(format!("unknown driver '{other}'"))),
        }
    }

    /// Canonical driver name.
    #[must_use]
    pub const fn driver_name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite3",
            Self::MySql => "mysql",
        }
    }

    /// Escape byte used in prefix patterns.
    #[must_use]
    pub const fn escape_char(self) -> u8 {
        b'\\'
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::Sqlite => format!("\"{ident}\""),
            Self::MySql => format!("`{ident}`"),
        }
    }

    /// `ESCAPE` clause as written in SQL text.
    ///
    /// `MySQL` treats backslash as an escape inside string literals, so the
    /// literal has to double it.
    #[must_use]
    pub const fn escape_clause(self) -> &'static str {
        match self {
            Self::Sqlite => "ESCAPE '\\'",
            Self::MySql => "ESCAPE '\\\\'",
        }
    }

    const fn key_column_type(self) -> &'static str {
        match self {
            Self::Sqlite => "BLOB",
            // InnoDB caps index keys at 3072 bytes.
            Self::MySql => "VARBINARY(3072)",
        }
    }

    const fn value_column_type(self) -> &'static str {
        match self {
            Self::Sqlite => "BLOB",
            Self::MySql => "LONGBLOB",
        }
    }

    const fn upsert_verb(self) -> &'static str {
        match self {
            Self::Sqlite => "INSERT OR REPLACE INTO",
            Self::MySql => "REPLACE INTO",
        }
    }

    /// Statement that makes `LIKE` compare case-sensitively, if the dialect needs one.
    #[must_use]
    pub const fn case_sensitivity_pragma(self) -> Option<&'static str> {
        match self {
            Self::Sqlite => Some("PRAGMA case_sensitive_like = true"),
            // Binary columns already compare byte for byte.
            Self::MySql => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}

/// Checks that `name` can be interpolated into SQL as a table name.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless `name` is a plain ASCII identifier of
/// at most [`MAX_TABLE_NAME_LEN`] bytes.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut bytes = name.bytes();
    let valid_start = bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
    let valid_rest = bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_');

    if !valid_start || !valid_rest {
        return Err(Error::InvalidInput(format!(
            "table name '{name}' must be an ASCII identifier"
        )));
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "table name '{name}' exceeds {MAX_TABLE_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Statement texts for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementSet {
    /// Dialect the statements were generated for.
    pub dialect: Dialect,
    /// Unquoted table name.
    pub table_name: String,
    /// `CREATE TABLE IF NOT EXISTS`.
    pub create_table: String,
    /// `CREATE TABLE` that fails if the table already exists.
    pub create_fresh_table: String,
    /// Case-sensitivity directive, when the dialect has one.
    pub pragma: Option<String>,
    /// Upsert of one record.
    pub put: String,
    /// Value lookup by key.
    pub get: String,
    /// Removal by key.
    pub delete: String,
    /// Number of keys matching a prefix pattern.
    pub count_prefix: String,
    /// Values matching a prefix pattern, in key order.
    pub fetch_prefix: String,
    /// Keys matching a prefix pattern, in key order.
    pub keys_prefix: String,
    /// Key-value pairs matching a prefix pattern, in key order.
    pub process_prefix: String,
    /// `DROP TABLE IF EXISTS`.
    pub drop_table: String,
}

impl StatementSet {
    /// Generates the statements for `table_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the table name is not a plain identifier.
    pub fn generate(dialect: Dialect, table_name: &str) -> Result<Self> {
        validate_table_name(table_name)?;

        let table = dialect.quote(table_name);
        let key = dialect.quote("key");
        let value = dialect.quote("value");
        let escape = dialect.escape_clause();
        let prefix_filter = format!("WHERE {key} LIKE ? {escape}");
        let columns = format!(
            "({key} {} NOT NULL PRIMARY KEY, {value} {})",
            dialect.key_column_type(),
            dialect.value_column_type(),
        );

        Ok(Self {
            dialect,
            table_name: table_name.to_string(),
            create_table: format!("CREATE TABLE IF NOT EXISTS {table} {columns}"),
            create_fresh_table: format!("CREATE TABLE {table} {columns}"),
            pragma: dialect.case_sensitivity_pragma().map(str::to_string),
            put: format!(
                "{} {table} ({key}, {value}) VALUES (?, ?)",
                dialect.upsert_verb()
            ),
            get: format!("SELECT {value} FROM {table} WHERE {key} = ?"),
            delete: format!("DELETE FROM {table} WHERE {key} = ?"),
            count_prefix: format!("SELECT COUNT({key}) FROM {table} {prefix_filter}"),
            fetch_prefix: format!("SELECT {value} FROM {table} {prefix_filter} ORDER BY {key}"),
            keys_prefix: format!("SELECT {key} FROM {table} {prefix_filter} ORDER BY {key}"),
            process_prefix: format!(
                "SELECT {key}, {value} FROM {table} {prefix_filter} ORDER BY {key}"
            ),
            drop_table: format!("DROP TABLE IF EXISTS {table}"),
        })
    }

    /// Statements prepared up front when a namespace is opened.
    #[must_use]
    pub fn preparable(&self) -> [&str; 7] {
        [
            &self.put,
            &self.get,
            &self.delete,
            &self.count_prefix,
            &self.fetch_prefix,
            &self.keys_prefix,
            &self.process_prefix,
        ]
    }
}
