// src/config.rs
//! Run configuration: run settings, data selection and filters.
//! TOML or JSON, picked by file extension.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::{FetchPolicy, RetryExhaustedPolicy};
use crate::filter::FilterSpec;

pub const ENV_CONFIG_PATH: &str = "ARXIV_WATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/arxiv_watch.toml";

fn default_output_folder() -> PathBuf {
    PathBuf::from("output")
}
fn default_display_by() -> String {
    "filters".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_unit_secs() -> u64 {
    3
}
fn default_min_request_interval_secs() -> u64 {
    4
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    /// "entries" | "filters"; validated when the run starts.
    #[serde(default = "default_display_by")]
    pub display_by: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub on_retry_exhausted: RetryExhaustedPolicy,
    #[serde(default = "default_backoff_unit_secs")]
    pub backoff_unit_secs: u64,
    #[serde(default = "default_min_request_interval_secs")]
    pub min_request_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry_request_errors: bool,
    #[serde(default = "default_true")]
    pub open_result: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSettings {
    pub categories: Vec<String>,
    #[serde(default)]
    pub days_to_fetch: u32,
    #[serde(default)]
    pub only_new_days: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub run: RunSettings,
    pub data: DataSettings,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

impl RunConfig {
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.run.max_retries,
            backoff_unit: Duration::from_secs(self.run.backoff_unit_secs),
            min_request_interval: Duration::from_secs(self.run.min_request_interval_secs),
            on_retry_exhausted: self.run.on_retry_exhausted,
            retry_request_errors: self.run.retry_request_errors,
        }
    }

    /// Reject configurations the pipeline cannot run meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.data.categories.is_empty() {
            bail!("data.categories must name at least one arXiv category");
        }
        if self.data.categories.iter().any(|c| c.trim().is_empty()) {
            bail!("data.categories contains a blank category");
        }
        let mut seen = HashSet::new();
        for f in &self.filters {
            if f.name.trim().is_empty() {
                bail!("filter with blank name");
            }
            if !seen.insert(f.name.as_str()) {
                bail!("duplicate filter name `{}`", f.name);
            }
            if f.keywords.iter().any(|k| k.trim().is_empty()) {
                bail!("filter `{}` has a blank keyword", f.name);
            }
            if !f.keywords.is_empty() && f.fields.is_empty() {
                bail!("filter `{}` has keywords but no fields", f.name);
            }
        }
        Ok(())
    }

    /// Resolve a relative output folder against `base` (the config's directory).
    pub fn resolve_output_folder(&mut self, base: &Path) {
        if self.run.output_folder.is_relative() {
            self.run.output_folder = base.join(&self.run.output_folder);
        }
    }
}

/// Load and validate a config file. Relative output folders are resolved
/// against the file's directory.
pub fn load_config_from(path: &Path) -> Result<RunConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading run config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg =
        parse_config(&content, &ext).with_context(|| format!("parsing {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    cfg.resolve_output_folder(base);
    Ok(cfg)
}

/// Config path precedence:
/// 1) explicit path (CLI)
/// 2) $ARXIV_WATCH_CONFIG
/// 3) config/arxiv_watch.toml
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn parse_config(s: &str, ext: &str) -> Result<RunConfig> {
    match ext {
        "json" => serde_json::from_str(s).context("invalid JSON run config"),
        _ => toml::from_str(s).context("invalid TOML run config"),
    }
}
