//! Configuration parsing and validation.
//!
//! Health Sync is configured through a TOML file (default
//! `./config/hsync.toml`). Only `[export].path` is required; every other
//! section has defaults.
//!
//! ```toml
//! [export]
//! path = "/Users/me/Downloads/apple_health_export/export.xml"
//!
//! [upload]
//! chunk_size = 100
//!
//! [auth]
//! token_path = "./token.json"
//!
//! [metrics.calories]
//! chunk_size = 1000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use health_sync_core::catalog::{find_spec, MetricSpec};

/// Google Fit REST base for the authenticated user.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/fitness/v1/users/me";

/// Environment variable that supplies a bearer token directly.
pub const ACCESS_TOKEN_ENV: &str = "HSYNC_ACCESS_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub export: ExportConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Per-metric overrides keyed by metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    /// Per-request timeout. Unset leaves the transport default in place.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            api_base: default_api_base(),
            application_name: default_application_name(),
            timeout_secs: None,
        }
    }
}

fn default_chunk_size() -> usize {
    100
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_application_name() -> String {
    "AppleHealthSyncer".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Token file written by the authorization tool. Read only.
    #[serde(default)]
    pub token_path: Option<PathBuf>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            scopes: default_scopes(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    [
        "https://www.googleapis.com/auth/fitness.body.write",
        "https://www.googleapis.com/auth/fitness.activity.write",
        "https://www.googleapis.com/auth/fitness.sleep.write",
        "https://www.googleapis.com/auth/fitness.heart_rate.write",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetricOverride {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub stream_name: Option<String>,
}

impl Config {
    /// Points per upload call for a metric: the `[metrics.<name>]` override,
    /// else the catalog's preference, else `upload.chunk_size`.
    pub fn chunk_size_for(&self, spec: &MetricSpec) -> usize {
        self.metrics
            .get(spec.name())
            .and_then(|m| m.chunk_size)
            .or(spec.chunk_size)
            .unwrap_or(self.upload.chunk_size)
    }

    /// Destination stream name for a metric.
    pub fn stream_name_for(&self, spec: &MetricSpec) -> String {
        self.metrics
            .get(spec.name())
            .and_then(|m| m.stream_name.clone())
            .unwrap_or_else(|| spec.stream_name.to_string())
    }

    /// A config pointing at `export_path` with every other value defaulted.
    pub fn for_export(export_path: impl Into<PathBuf>) -> Self {
        Self {
            export: ExportConfig {
                path: export_path.into(),
            },
            upload: UploadConfig::default(),
            auth: AuthConfig::default(),
            metrics: BTreeMap::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.export.path.as_os_str().is_empty() {
        anyhow::bail!("export.path must not be empty");
    }

    // Validate upload
    if config.upload.chunk_size == 0 {
        anyhow::bail!("upload.chunk_size must be > 0");
    }
    if config.upload.api_base.trim().is_empty() {
        anyhow::bail!("upload.api_base must not be empty");
    }
    if config.upload.timeout_secs == Some(0) {
        anyhow::bail!("upload.timeout_secs must be > 0 when set");
    }

    // Validate auth
    if config.auth.scopes.is_empty() {
        anyhow::bail!("auth.scopes must list at least one scope");
    }
    for scope in &config.auth.scopes {
        if !scope.starts_with("https://") {
            anyhow::bail!("auth.scopes entry '{}' must be an https:// URL", scope);
        }
    }

    // Validate per-metric overrides
    for (name, metric) in &config.metrics {
        if find_spec(name).is_none() {
            anyhow::bail!(
                "Unknown metric in [metrics.{}]. Run `hsync metrics` for the list.",
                name
            );
        }
        if metric.chunk_size == Some(0) {
            anyhow::bail!("metrics.{}.chunk_size must be > 0", name);
        }
        if let Some(stream) = &metric.stream_name {
            if stream.trim().is_empty() {
                anyhow::bail!("metrics.{}.stream_name must not be empty", name);
            }
        }
    }

    Ok(())
}
