//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine settings. Every field has a default so partial files load cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed UTC offset (hours) the schedule source writes its timestamps in
    #[serde(default = "default_source_offset")]
    pub source_utc_offset_hours: i32,
    /// Honour a `+HHMM` suffix on timestamps instead of the fixed offset
    #[serde(default)]
    pub use_embedded_offset: bool,
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,
    // Matching
    #[serde(default = "default_keyword_slack")]
    pub keyword_count_slack: usize,
    #[serde(default = "default_similarity")]
    pub similarity_threshold: f64,
    #[serde(default = "default_loose_similarity")]
    pub loose_similarity_threshold: f64,
    #[serde(default = "default_loose_max_keywords")]
    pub loose_max_alias_keywords: usize,
    #[serde(default = "default_min_keyword_len")]
    pub min_similarity_keyword_len: usize,
    /// Playlist-name fragment -> schedule channel id, tried last
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    // Caches
    #[serde(default = "default_resolution_cache")]
    pub resolution_cache_size: usize,
    #[serde(default = "default_timestamp_cache")]
    pub timestamp_cache_size: usize,
    #[serde(default = "default_program_ttl")]
    pub program_cache_ttl_secs: i64,
    #[serde(default = "default_listing_limit")]
    pub listing_limit: usize,
}

fn default_source_offset() -> i32 { 3 }
fn default_placeholder_title() -> String { "No title".to_string() }
fn default_keyword_slack() -> usize { 1 }
fn default_similarity() -> f64 { 0.85 }
fn default_loose_similarity() -> f64 { 0.8 }
fn default_loose_max_keywords() -> usize { 3 }
fn default_min_keyword_len() -> usize { 4 }
fn default_resolution_cache() -> usize { 2048 }
fn default_timestamp_cache() -> usize { 4096 }
fn default_program_ttl() -> i64 { 60 }
fn default_listing_limit() -> usize { 10 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_utc_offset_hours: default_source_offset(),
            use_embedded_offset: false,
            placeholder_title: default_placeholder_title(),
            keyword_count_slack: default_keyword_slack(),
            similarity_threshold: default_similarity(),
            loose_similarity_threshold: default_loose_similarity(),
            loose_max_alias_keywords: default_loose_max_keywords(),
            min_similarity_keyword_len: default_min_keyword_len(),
            aliases: BTreeMap::new(),
            resolution_cache_size: default_resolution_cache(),
            timestamp_cache_size: default_timestamp_cache(),
            program_cache_ttl_secs: default_program_ttl(),
            listing_limit: default_listing_limit(),
        }
    }
}

impl EngineConfig {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("epg_resolver");
        fs::create_dir_all(&path).ok();
        path.push("config.json");
        path
    }

    /// Load from the user config directory, falling back to defaults.
    pub fn load() -> Self {
        let path = Self::config_path();

        if path.exists() {
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(config) = serde_json::from_str::<EngineConfig>(&content) {
                    return config.sanitized();
                }
            }
        }

        Self::default()
    }

    /// Load from an explicit file; errors are reported rather than swallowed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Save to the user config directory; failures are logged, not returned.
    pub fn save(&self) {
        let path = Self::config_path();
        if let Err(e) = self.save_to(&path) {
            warn!(path = %path.display(), error = %e, "failed to save config");
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Clamp values that would make the engine misbehave.
    pub fn sanitized(mut self) -> Self {
        self.similarity_threshold = clamp_unit(self.similarity_threshold, default_similarity());
        self.loose_similarity_threshold =
            clamp_unit(self.loose_similarity_threshold, default_loose_similarity());
        self.source_utc_offset_hours = self.source_utc_offset_hours.clamp(-14, 14);
        self.resolution_cache_size = self.resolution_cache_size.max(1);
        self.timestamp_cache_size = self.timestamp_cache_size.max(1);
        self.program_cache_ttl_secs = self.program_cache_ttl_secs.max(1);
        self.listing_limit = self.listing_limit.max(1);
        self
    }
}

fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}
