//! Configuration resolution for mediatag-ingest
//!
//! Each setting is resolved with ENV → TOML → default priority. The index
//! table name has no default: startup fails when neither source provides it.

use mediatag_common::config::{default_data_dir, TomlConfig};
use mediatag_common::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

use crate::pipeline::{PipelineConfig, SiblingOrder, TagValuePolicy};

/// Default region of the key-value index
pub const DEFAULT_INDEX_REGION: &str = "us-west-2";

/// Default HTTP port of the notification intake
pub const DEFAULT_PORT: u16 = 5780;

pub const ENV_TABLE_NAME: &str = "MEDIATAG_TABLE_NAME";
pub const ENV_GROUP_TABLE_NAME: &str = "MEDIATAG_GROUP_TABLE_NAME";
pub const ENV_REGION: &str = "MEDIATAG_REGION";
pub const ENV_INDEX_BACKEND: &str = "MEDIATAG_INDEX_BACKEND";
pub const ENV_SQLITE_PATH: &str = "MEDIATAG_SQLITE_PATH";
pub const ENV_ENDPOINT_URL: &str = "MEDIATAG_ENDPOINT_URL";
pub const ENV_TIMEOUT_MS: &str = "MEDIATAG_TIMEOUT_MS";
pub const ENV_TAG_VALUE_POLICY: &str = "MEDIATAG_TAG_VALUE_POLICY";
pub const ENV_INCLUDE_OBJECT_STATS: &str = "MEDIATAG_INCLUDE_OBJECT_STATS";
pub const ENV_SIBLING_ORDER: &str = "MEDIATAG_SIBLING_ORDER";
pub const ENV_PORT: &str = "MEDIATAG_PORT";

/// Key-value index backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBackend {
    DynamoDb,
    Sqlite { path: PathBuf },
}

/// Key-value index settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub table_name: String,
    pub group_table_name: String,
    pub region: String,
    pub backend: IndexBackend,
}

/// Settings shared by the AWS clients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsSettings {
    /// Region for the object store and detection clients (SDK default chain when unset)
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub index: IndexSettings,
    pub aws: AwsSettings,
    pub pipeline: PipelineConfig,
    pub port: u16,
}

/// Resolve the service configuration from environment and TOML values
pub fn resolve_config(toml_config: &TomlConfig) -> Result<IngestConfig> {
    let index_section = &toml_config.index;
    let pipeline_section = &toml_config.pipeline;

    let table_name = resolve_setting(
        "index table name",
        &[ENV_TABLE_NAME],
        index_section.table_name.clone(),
    )
    .ok_or_else(|| {
        Error::Config(format!(
            "Index table name not configured. Set one of:\n\
             1. Environment: {}=<table>\n\
             2. TOML config: [index] table_name = \"<table>\"",
            ENV_TABLE_NAME
        ))
    })?;

    let group_table_name = resolve_setting(
        "group table name",
        &[ENV_GROUP_TABLE_NAME],
        index_section.group_table_name.clone(),
    )
    .unwrap_or_else(|| table_name.clone());

    let region = resolve_setting(
        "index region",
        &[ENV_REGION, "AWS_REGION"],
        index_section.region.clone(),
    )
    .unwrap_or_else(|| DEFAULT_INDEX_REGION.to_string());

    let backend_name = resolve_setting(
        "index backend",
        &[ENV_INDEX_BACKEND],
        index_section.backend.clone(),
    )
    .map(|b| b.to_ascii_lowercase());

    let backend = match backend_name.as_deref() {
        None | Some("dynamodb") => IndexBackend::DynamoDb,
        Some("sqlite") => {
            let path = resolve_setting(
                "sqlite path",
                &[ENV_SQLITE_PATH],
                index_section
                    .sqlite_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
            )
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("index.db"));
            IndexBackend::Sqlite { path }
        }
        Some(other) => {
            return Err(Error::Config(format!(
                "Unknown index backend '{}' (expected 'dynamodb' or 'sqlite')",
                other
            )))
        }
    };

    let aws = AwsSettings {
        region: toml_config.aws.region.clone().filter(|r| is_set(r)),
        endpoint_url: resolve_setting(
            "endpoint override",
            &[ENV_ENDPOINT_URL],
            toml_config.aws.endpoint_url.clone(),
        ),
        timeout_ms: resolve_setting(
            "operation timeout",
            &[ENV_TIMEOUT_MS],
            toml_config.aws.timeout_ms.map(|ms| ms.to_string()),
        )
        .map(|raw| parse_value::<u64>(ENV_TIMEOUT_MS, &raw))
        .transpose()?,
    };

    let mut pipeline = PipelineConfig::new(table_name.clone());
    pipeline.group_table = group_table_name.clone();

    if let Some(raw) = resolve_setting(
        "tag value policy",
        &[ENV_TAG_VALUE_POLICY],
        pipeline_section.tag_value_policy.clone(),
    ) {
        pipeline.tag_value_policy = TagValuePolicy::from_str(&raw).map_err(Error::Config)?;
    }

    if let Some(raw) = resolve_setting(
        "include object stats",
        &[ENV_INCLUDE_OBJECT_STATS],
        pipeline_section.include_object_stats.map(|b| b.to_string()),
    ) {
        pipeline.include_object_stats = parse_bool(ENV_INCLUDE_OBJECT_STATS, &raw)?;
    }

    if let Some(raw) = resolve_setting(
        "sibling order",
        &[ENV_SIBLING_ORDER],
        pipeline_section.sibling_order.clone(),
    ) {
        pipeline.sibling_order = SiblingOrder::from_str(&raw).map_err(Error::Config)?;
    }

    if let Some(reindex) = pipeline_section.reindex_on_tagging {
        pipeline.reindex_on_tagging = reindex;
    }
    if let Some(extensions) = &pipeline_section.image_extensions {
        pipeline.image_extensions = extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
    }
    if let Some(ext) = pipeline_section.primary_extension.as_deref().filter(|e| is_set(e)) {
        pipeline.primary_extension = normalize_extension(ext);
    }
    if let Some(ext) = pipeline_section.companion_extension.as_deref().filter(|e| is_set(e)) {
        pipeline.companion_extension = normalize_extension(ext);
    }

    let port = resolve_setting(
        "HTTP port",
        &[ENV_PORT],
        toml_config.server.port.map(|p| p.to_string()),
    )
    .map(|raw| parse_value::<u16>(ENV_PORT, &raw))
    .transpose()?
    .unwrap_or(DEFAULT_PORT);

    Ok(IngestConfig {
        index: IndexSettings {
            table_name,
            group_table_name,
            region,
            backend,
        },
        aws,
        pipeline,
        port,
    })
}

/// Resolve one string setting: first non-blank ENV value, else the TOML value
///
/// Warns when more than one source provides a value.
fn resolve_setting(name: &str, env_names: &[&str], toml_value: Option<String>) -> Option<String> {
    let env_value = env_names.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .filter(|v| is_set(v))
            .map(|v| (*var, v.trim().to_string()))
    });
    let toml_value = toml_value.filter(|v| is_set(v)).map(|v| v.trim().to_string());

    match (env_value, toml_value) {
        (Some((var, value)), toml_value) => {
            if toml_value.is_some() {
                warn!(
                    "{} found in multiple sources: environment, TOML. Using {} (highest priority).",
                    name, var
                );
            }
            info!("{} loaded from environment variable {}", name, var);
            Some(value)
        }
        (None, Some(value)) => {
            info!("{} loaded from TOML config", name);
            Some(value)
        }
        (None, None) => None,
    }
}

/// Non-empty, non-whitespace
pub fn is_set(value: &str) -> bool {
    !value.trim().is_empty()
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{}: expected a boolean, got '{}'",
            name, raw
        ))),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::Config(format!("{}: invalid value '{}': {}", name, raw, e)))
}
