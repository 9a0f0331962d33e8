use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Catalog root (discovered as ./data or ../data when unset)
    pub data_dir: Option<PathBuf>,

    /// Seconds a built search index stays fresh
    pub index_ttl_secs: u64,

    /// Search limit when the caller gives none or an invalid one
    pub default_limit: usize,

    /// Upper bound for any requested limit
    pub max_limit: usize,

    /// HTTP listen address
    pub bind_addr: String,

    /// Build the index in the background at startup
    pub warm_on_start: bool,

    /// Also write daily-rotated log files here
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            index_ttl_secs: 600,
            default_limit: 50,
            max_limit: 500,
            bind_addr: "127.0.0.1:3000".to_string(),
            warm_on_start: true,
            log_dir: None,
        }
    }
}

impl Config {
    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load the per-user config when it exists, otherwise defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/catalog-search/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("catalog-search").join("config.json"))
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }

    /// Resolve a caller-supplied limit.
    ///
    /// Missing, zero or unparseable values fall back to the default and the
    /// result never exceeds `max_limit`.
    pub fn resolve_limit(&self, requested: Option<&str>) -> usize {
        self.clamp_limit(requested.and_then(|raw| raw.trim().parse::<usize>().ok()))
    }

    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit.max(1))
    }
}
