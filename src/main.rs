//! Binary entry point for sqlkv.
//!
//! A small CLI for inspecting and editing a sqlkv namespace.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlkv::config::SqlkvConfig;
use sqlkv::observability;
use sqlkv::{PrefixReader, Reader, SqlStorage, Storage, Writer};
use std::path::Path;
use std::process::ExitCode;

/// sqlkv - ordered byte-string key-value storage on a SQL table.
#[derive(Parser)]
#[command(name = "sqlkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Database driver (overrides the config file).
    #[arg(long, global = true, env = "SQLKV_DRIVER")]
    driver: Option<String>,

    /// Data source, e.g. a database path (overrides the config file).
    #[arg(short, long, global = true, env = "SQLKV_DATA_SOURCE")]
    data_source: Option<String>,

    /// Table backing the namespace (overrides the config file).
    #[arg(short, long, global = true, env = "SQLKV_TABLE")]
    table: Option<String>,

    /// Read keys and values as hex and print them as hex.
    #[arg(long, global = true)]
    hex: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the value stored under a key.
    Get {
        /// The key.
        key: String,
    },

    /// Store a value under a key.
    Put {
        /// The key.
        key: String,
        /// The value.
        value: String,
    },

    /// Remove a key.
    Delete {
        /// The key.
        key: String,
    },

    /// Report whether any key starts with a prefix.
    HasPrefix {
        /// The prefix (empty matches everything).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// List keys starting with a prefix, in key order.
    Keys {
        /// The prefix (empty matches everything).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// List values whose keys start with a prefix, in key order.
    Fetch {
        /// The prefix (empty matches everything).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// List key-value pairs whose keys start with a prefix, in key order.
    Scan {
        /// The prefix (empty matches everything).
        #[arg(default_value = "")]
        prefix: String,

        /// Print one JSON object per pair.
        #[arg(long)]
        json: bool,
    },

    /// Drop the backing table.
    Drop,

    /// Compact the database.
    Compact,
}

/// One scanned pair, as printed by `scan --json`.
#[derive(Serialize)]
struct ScanEntry {
    key: String,
    value: String,
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_config(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, mut config: SqlkvConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(driver) = cli.driver {
        config.storage.driver = driver;
    }
    if let Some(data_source) = cli.data_source {
        config.storage.data_source = data_source;
    }
    if let Some(table) = cli.table {
        config.storage.table_name = table;
    }

    let codec = Codec { hex: cli.hex };
    let storage = SqlStorage::from_config(&config.storage)?;

    let result = match cli.command {
        Commands::Get { key } => cmd_get(&storage, codec, &key),
        Commands::Put { key, value } => {
            storage.put(&codec.decode(&key)?, &codec.decode(&value)?)?;
            Ok(())
        },
        Commands::Delete { key } => {
            storage.delete(&codec.decode(&key)?)?;
            Ok(())
        },
        Commands::HasPrefix { prefix } => {
            println!("{}", storage.has_prefix(&codec.decode(&prefix)?)?);
            Ok(())
        },
        Commands::Keys { prefix } => {
            for key in storage.keys_by_prefix(&codec.decode(&prefix)?)? {
                println!("{}", codec.encode(&key));
            }
            Ok(())
        },
        Commands::Fetch { prefix } => {
            for value in storage.fetch_by_prefix(&codec.decode(&prefix)?)? {
                println!("{}", codec.encode(&value));
            }
            Ok(())
        },
        Commands::Scan { prefix, json } => cmd_scan(&storage, codec, &prefix, json),
        Commands::Drop => {
            storage.drop_db()?;
            println!("Dropped table '{}'", storage.table_name());
            Ok(())
        },
        Commands::Compact => {
            storage.compact_db()?;
            Ok(())
        },
    };

    storage.close()?;
    result
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> Result<SqlkvConfig, Box<dyn std::error::Error>> {
    // If a path is provided, load from that file
    if let Some(config_path) = path {
        return SqlkvConfig::load_from_file(Path::new(config_path))
            .map_err(std::convert::Into::into);
    }

    // Environment override for config path
    if let Ok(config_path) = std::env::var("SQLKV_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            return SqlkvConfig::load_from_file(Path::new(&config_path))
                .map_err(std::convert::Into::into);
        }
    }

    Ok(SqlkvConfig::load_default())
}

/// Converts between command-line text and raw bytes.
#[derive(Clone, Copy)]
struct Codec {
    hex: bool,
}

impl Codec {
    fn decode(self, input: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        if self.hex {
            Ok(hex::decode(input)?)
        } else {
            Ok(input.as_bytes().to_vec())
        }
    }

    fn encode(self, bytes: &[u8]) -> String {
        if self.hex {
            hex::encode(bytes)
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

fn cmd_get(storage: &SqlStorage, codec: Codec, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = codec.decode(key)?;
    match storage.get(&key) {
        Ok(value) => {
            println!("{}", codec.encode(&value));
            Ok(())
        },
        Err(e) if e.is_not_found() => Err(format!("key '{}' not found", codec.encode(&key)).into()),
        Err(e) => Err(e.into()),
    }
}

fn cmd_scan(
    storage: &SqlStorage,
    codec: Codec,
    prefix: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let prefix = codec.decode(prefix)?;
    let mut count = 0usize;
    storage.process_by_prefix(&prefix, |key, value| {
        count += 1;
        let (key, value) = (codec.encode(key), codec.encode(value));
        if json {
            let line = serde_json::to_string(&ScanEntry { key, value })
                .map_err(sqlkv::Error::processor)?;
            println!("{line}");
        } else {
            println!("{key}\t{value}");
        }
        Ok(())
    })?;

    if !json {
        eprintln!("{count} entries");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "sqlkv", "--hex", "--table", "packages", "get", "6b6579",
        ])
        .unwrap();
        assert!(cli.hex);
        assert_eq!(cli.table.as_deref(), Some("packages"));
        assert!(matches!(cli.command, Commands::Get { ref key } if key == "6b6579"));
    }

    #[test]
    fn test_cli_scan_defaults_to_empty_prefix() {
        let cli = Cli::try_parse_from(["sqlkv", "scan", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { ref prefix, json: true } if prefix.is_empty()));
    }

    #[test]
    fn test_codec_hex() {
        let codec = Codec { hex: true };
        assert_eq!(codec.decode("00ff").unwrap(), vec![0x00, 0xff]);
        assert_eq!(codec.encode(&[0x80, 0x01]), "8001");
        assert!(codec.decode("zz").is_err());
    }

    #[test]
    fn test_codec_text() {
        let codec = Codec { hex: false };
        assert_eq!(codec.decode("key").unwrap(), b"key");
        assert_eq!(codec.encode(b"value"), "value");
    }
}
