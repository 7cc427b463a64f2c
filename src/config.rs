use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub sqlite_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reunite")
        .join("reunite.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_db_path(),
        }
    }
}

/// File storage layout. Paths recorded in the database are rooted at `root`
/// with a leading slash (e.g. "/uploads/public-reports/abc.jpg").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reunite")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageConfig {
    /// Resolve a database-stored path ("/uploads/...") to a filesystem path.
    pub fn resolve(&self, stored: &str) -> PathBuf {
        self.root.join(stored.trim_start_matches('/'))
    }

    /// Directory where matched video frames are written.
    pub fn matched_frames_dir(&self) -> PathBuf {
        self.root.join("uploads").join("matched-frames")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Fraction of 100; a case matches when confidence >= threshold * 100.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Analyze every Nth video frame; the rest are decoded and discarded.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,

    /// Scheduler poll interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_frame_skip() -> u32 {
    30
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            frame_skip: default_frame_skip(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&content)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            // First run: write defaults so the operator has a file to edit
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("REUNITE_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reunite")
            .join("config.toml")
    }
}
