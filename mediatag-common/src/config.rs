//! Configuration file loading and path resolution
//!
//! The TOML file carries bootstrap settings only. Typed resolution
//! (ENV → TOML → default) is done by each service against these raw values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "MEDIATAG_CONFIG";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional so a missing file and an empty file behave alike.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Key-value index settings
    #[serde(default)]
    pub index: IndexSection,

    /// AWS client settings shared by the object store and label detection clients
    #[serde(default)]
    pub aws: AwsSection,

    /// Pipeline behavior toggles
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// HTTP intake settings
    #[serde(default)]
    pub server: ServerSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[index]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IndexSection {
    /// Table receiving per-tag records (required, from here or ENV)
    pub table_name: Option<String>,
    /// Table receiving per-group aggregate records (defaults to `table_name`)
    pub group_table_name: Option<String>,
    /// Region of the index
    pub region: Option<String>,
    /// Index backend: "dynamodb" or "sqlite"
    pub backend: Option<String>,
    /// Database file for the sqlite backend
    pub sqlite_path: Option<PathBuf>,
}

/// `[aws]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwsSection {
    /// Region for the object store and label detection clients
    pub region: Option<String>,
    /// Endpoint override (LocalStack, MinIO, ...)
    pub endpoint_url: Option<String>,
    /// Per-operation timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// `[pipeline]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineSection {
    /// "infer", "text" or "number"
    pub tag_value_policy: Option<String>,
    /// Add object size and last-modified to tag records
    pub include_object_stats: Option<bool>,
    /// "lexicographic" or "listing"
    pub sibling_order: Option<String>,
    /// Re-index an image's stored tags when a tagging event arrives
    pub reindex_on_tagging: Option<bool>,
    /// Key extensions treated as images (without the dot)
    pub image_extensions: Option<Vec<String>>,
    /// Key extension of group-defining primary objects
    pub primary_extension: Option<String>,
    /// Key extension of companion images aggregated into a group
    pub companion_extension: Option<String>,
}

/// `[server]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerSection {
    /// HTTP port for the notification intake
    pub port: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the configuration file
///
/// Priority order:
/// 1. Command-line argument (must exist)
/// 2. `MEDIATAG_CONFIG` environment variable (must exist)
/// 3. `<config dir>/mediatag/config.toml` if present
///
/// Returns `Ok(None)` when no file is configured and the default is absent.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    Ok(default_config_path().filter(|p| p.exists()))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Platform default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mediatag").join("config.toml"))
}

/// Platform default data directory (sqlite index location)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mediatag"))
        .unwrap_or_else(|| PathBuf::from("./mediatag_data"))
}

/// Load TOML configuration from file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load the located configuration file, or defaults when there is none
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match locate_config_file(cli_arg)? {
        Some(path) => load_toml_config(&path),
        None => {
            debug!("No configuration file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}
