//! Configuration management.
//!
//! Configuration is read from a TOML file:
//!
//! ```toml
//! [storage]
//! driver = "sqlite3"
//! data_source = "/var/lib/sqlkv/packages.db"
//! table_name = "packages"
//! busy_timeout_ms = 5000
//!
//! [logging]
//! format = "json"
//! level = "debug"
//! file = "/var/log/sqlkv.log"
//! ```
//!
//! Every key is optional; missing keys keep their defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Default driver name.
pub const DEFAULT_DRIVER: &str = "sqlite3";

/// Default data source: a private in-memory database.
pub const DEFAULT_DATA_SOURCE: &str = ":memory:";

/// Default table name.
pub const DEFAULT_TABLE_NAME: &str = "kv";

/// Default busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Main configuration for sqlkv.
#[derive(Debug, Clone, Default)]
pub struct SqlkvConfig {
    /// Storage backend settings.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Where and how a storage handle connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Driver name: `sqlite3`, `sqlite`, `mysql`.
    pub driver: String,
    /// Driver-specific data source (a path or `:memory:` for `SQLite`).
    pub data_source: String,
    /// Backing table of the main namespace.
    pub table_name: String,
    /// How long to wait on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StorageConfig {
    /// Sets the driver name.
    #[must_use]
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Sets the data source.
    #[must_use]
    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = data_source.into();
        self
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Sets the busy timeout in milliseconds.
    #[must_use]
    pub const fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Logging section of the config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `sqlkv=debug`.
    pub level: Option<String>,
    /// Log file path; logs go to stderr when unset.
    pub file: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Driver name.
    pub driver: Option<String>,
    /// Data source.
    pub data_source: Option<String>,
    /// Table name.
    pub table_name: Option<String>,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
}

impl SqlkvConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this layout.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/sqlkv/` on macOS)
    /// 2. XDG config dir (`~/.config/sqlkv/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        default_config_paths()
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| Self::load_from_file(&path).ok())
            .unwrap_or_default()
    }

    /// Converts a `ConfigFile` to `SqlkvConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(storage) = file.storage {
            if let Some(driver) = storage.driver {
                config.storage.driver = driver;
            }
            if let Some(data_source) = storage.data_source {
                config.storage.data_source = data_source;
            }
            if let Some(table_name) = storage.table_name {
                config.storage.table_name = table_name;
            }
            if let Some(busy_timeout_ms) = storage.busy_timeout_ms {
                config.storage.busy_timeout_ms = busy_timeout_ms;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Replaces the storage settings.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

/// Candidate config file locations, most specific first.
fn default_config_paths() -> Vec<PathBuf> {
    let Some(base_dirs) = directories::BaseDirs::new() else {
        return Vec::new();
    };
    vec![
        base_dirs.config_dir().join("sqlkv").join("config.toml"),
        base_dirs
            .home_dir()
            .join(".config")
            .join("sqlkv")
            .join("config.toml"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SqlkvConfig::new();
        assert_eq!(config.storage.driver, "sqlite3");
        assert_eq!(config.storage.data_source, ":memory:");
        assert_eq!(config.storage.table_name, "kv");
        assert_eq!(config.storage.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging, LoggingSettings::default());
    }

    #[test]
    fn test_builders() {
        let storage = StorageConfig::default()
            .with_driver("mysql")
            .with_data_source("user@tcp(db)/kv")
            .with_table_name("packages")
            .with_busy_timeout_ms(250);
        assert_eq!(storage.driver, "mysql");
        assert_eq!(storage.data_source, "user@tcp(db)/kv");
        assert_eq!(storage.table_name, "packages");
        assert_eq!(storage.busy_timeout(), Duration::from_millis(250));

        let config = SqlkvConfig::new().with_storage(storage.clone());
        assert_eq!(config.storage, storage);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = SqlkvConfig::from_toml(
            r#"
            [storage]
            table_name = "packages"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.table_name, "packages");
        assert_eq!(config.storage.driver, DEFAULT_DRIVER);
        assert_eq!(config.storage.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = SqlkvConfig::from_toml("").unwrap();
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = SqlkvConfig::from_toml("[storage]\nbusy_timeout_ms = \"soon\"");
        assert!(matches!(
            result,
            Err(Error::OperationFailed { ref operation, .. }) if operation == "parse_config_file"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[storage]\ndriver = \"sqlite\"\ndata_source = \"/tmp/kv.db\"\nbusy_timeout_ms = 100"
        )
        .unwrap();

        let config = SqlkvConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.storage.driver, "sqlite");
        assert_eq!(config.storage.data_source, "/tmp/kv.db");
        assert_eq!(config.storage.busy_timeout_ms, 100);
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = SqlkvConfig::load_from_file(Path::new("/nonexistent/sqlkv.toml"));
        assert!(matches!(
            result,
            Err(Error::OperationFailed { ref operation, .. }) if operation == "read_config_file"
        ));
    }

    #[test]
    fn test_default_config_paths_end_in_config_toml() {
        for path in default_config_paths() {
            assert!(path.ends_with("sqlkv/config.toml"));
        }
    }
}
