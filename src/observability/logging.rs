//! Structured logging configuration.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Filter used when neither the environment nor the config file sets one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Filter used with `--verbose`.
pub const VERBOSE_LOG_LEVEL: &str = "sqlkv=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Anything other than `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Environment overrides for logging.
#[derive(Debug, Clone, Default)]
pub struct LogEnv {
    /// `RUST_LOG`.
    pub filter: Option<String>,
    /// `SQLKV_LOG_FORMAT`.
    pub format: Option<String>,
    /// `SQLKV_LOG_FILE`.
    pub file: Option<String>,
}

impl LogEnv {
    /// Reads the overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            filter: var("RUST_LOG"),
            format: var("SQLKV_LOG_FORMAT"),
            file: var("SQLKV_LOG_FILE"),
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Event filter.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, &LogEnv::from_env())
    }

    /// Combines settings, the verbose flag and environment overrides.
    ///
    /// `--verbose` wins over everything for the filter; otherwise the
    /// environment wins over the config file.
    #[must_use]
    pub fn resolve(settings: Option<&LoggingSettings>, verbose: bool, env: &LogEnv) -> Self {
        let directive = if verbose {
            VERBOSE_LOG_LEVEL.to_string()
        } else {
            env.filter
                .clone()
                .or_else(|| settings.and_then(|s| s.level.clone()))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        };
        let filter =
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

        let format = env
            .format
            .as_deref()
            .or_else(|| settings.and_then(|s| s.format.as_deref()))
            .map(LogFormat::parse)
            .unwrap_or_default();

        let file = env
            .file
            .clone()
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .map(PathBuf::from);

        Self {
            filter,
            format,
            file,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::resolve(None, false, &LogEnv::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", LogFormat::Json)]
    #[test_case("JSON ", LogFormat::Json)]
    #[test_case("pretty", LogFormat::Pretty)]
    #[test_case("anything", LogFormat::Pretty)]
    fn test_log_format_parse(input: &str, expected: LogFormat) {
        assert_eq!(LogFormat::parse(input), expected);
    }

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
        assert_eq!(config.filter.to_string(), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_settings_apply() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            level: Some("debug".to_string()),
            file: Some("/tmp/sqlkv.log".to_string()),
        };
        let config = LoggingConfig::resolve(Some(&settings), false, &LogEnv::default());
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/sqlkv.log")));
        assert_eq!(config.filter.to_string(), "debug");
    }

    #[test]
    fn test_env_overrides_settings() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            level: Some("debug".to_string()),
            file: None,
        };
        let env = LogEnv {
            filter: Some("error".to_string()),
            format: Some("pretty".to_string()),
            file: Some("/var/log/sqlkv.log".to_string()),
        };
        let config = LoggingConfig::resolve(Some(&settings), false, &env);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/sqlkv.log")));
        assert_eq!(config.filter.to_string(), "error");
    }

    #[test]
    fn test_verbose_wins() {
        let env = LogEnv {
            filter: Some("error".to_string()),
            ..LogEnv::default()
        };
        let config = LoggingConfig::resolve(None, true, &env);
        assert!(config.filter.to_string().contains("sqlkv=debug"));
    }
}
