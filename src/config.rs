use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProspectConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub memory: MemoryConfig,
    pub analyzer: AnalyzerConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueueConfig {
    /// Total delivery attempts before a task goes terminal Failed.
    pub max_attempts: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    /// Worker sleep between polls when the queue is empty.
    pub poll_interval_ms: u64,
    /// Non-terminal tasks older than this are reported as stuck by `doctor`.
    pub stale_after_minutes: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Max entries held in the short-term cache before the oldest is evicted.
    pub short_term_capacity: usize,
    /// Short-term entries older than this are treated as expired.
    pub short_term_ttl_minutes: u64,
    /// Normalized similarity in [0,1] a past fingerprint must reach to count
    /// as a long-term match.
    pub similarity_threshold: f64,
    /// How many recent distinct fingerprints the similarity fallback scans.
    pub similarity_window: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. Never stored in the file.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SinkConfig {
    /// JSONL export of terminal results. Empty string disables the file sink.
    pub results_path: String,
}

impl Default for ProspectConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
            memory: MemoryConfig::default(),
            analyzer: AnalyzerConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_prospect_dir()
            .join("prospect.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 60_000,
            backoff_multiplier: 2.0,
            poll_interval_ms: 1_000,
            stale_after_minutes: 60,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 128,
            short_term_ttl_minutes: 24 * 60,
            similarity_threshold: 0.82,
            similarity_window: 200,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 60,
            temperature: 0.1,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        let results_path = default_prospect_dir()
            .join("results.jsonl")
            .to_string_lossy()
            .into_owned();
        Self { results_path }
    }
}

/// Returns `~/.prospect/`
pub fn default_prospect_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".prospect")
}

/// Returns the default config file path: `~/.prospect/config.toml`
pub fn default_config_path() -> PathBuf {
    default_prospect_dir().join("config.toml")
}

impl ProspectConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ProspectConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (PROSPECT_DB, PROSPECT_LOG_LEVEL,
    /// PROSPECT_ANALYZER_URL, PROSPECT_RESULTS).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PROSPECT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PROSPECT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("PROSPECT_ANALYZER_URL") {
            self.analyzer.base_url = val;
        }
        if let Ok(val) = std::env::var("PROSPECT_RESULTS") {
            self.sink.results_path = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
