//! Runtime configuration.
//!
//! Everything the collector needs is passed in explicitly: where files live,
//! how hard to retry, and how each data source is batched. A JSON file can
//! override any subset of the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Retry policy for transient HTTP faults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Cooldown after a TLS/SSL failure (default: 5 seconds)
    #[serde(default = "default_tls_cooldown", with = "duration_secs")]
    pub tls_cooldown: Duration,

    /// Cooldown after an empty or throttled response (default: 10 seconds)
    #[serde(default = "default_throttle_cooldown", with = "duration_secs")]
    pub throttle_cooldown: Duration,

    /// Multiplier applied to a cooldown each time it is repeated (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single cooldown (default: 5 minutes)
    #[serde(default = "default_max_delay", with = "duration_secs")]
    pub max_delay: Duration,

    /// Total attempts per request. `None` retries until the fault clears.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Statuses retried with the throttle cooldown (default: 429, 500, 502, 503, 504)
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tls_cooldown: default_tls_cooldown(),
            throttle_cooldown: default_throttle_cooldown(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            max_attempts: None,
            retry_statuses: default_retry_statuses(),
        }
    }
}

/// Files and pacing for one data source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub data_file: String,
    pub index_file: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after every request
    #[serde(default = "default_pause", with = "duration_secs")]
    pub pause: Duration,
}

impl SourceConfig {
    fn new(stem: &str, pause: Duration) -> Self {
        Self {
            data_file: format!("{stem}_data.csv"),
            index_file: format!("{stem}_index.txt"),
            batch_size: default_batch_size(),
            pause,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    #[serde(default = "default_app_list_file")]
    pub app_list_file: String,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Keyed by source name (`steam`, `steamspy`, ...)
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            app_list_file: default_app_list_file(),
            retry: RetryConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, source) in &self.sources {
            if source.batch_size == 0 {
                return Err(Error::Config(format!("source {name}: batch_size must be at least 1")));
            }
            if source.data_file == source.index_file {
                return Err(Error::Config(format!(
                    "source {name}: data_file and index_file must differ"
                )));
            }
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config("retry.backoff_multiplier must be >= 1.0".into()));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| Error::UnknownSource(name.to_string()))
    }

    pub fn app_list_path(&self) -> PathBuf {
        self.download_dir.join(&self.app_list_file)
    }

    pub fn data_path(&self, source: &SourceConfig) -> PathBuf {
        self.download_dir.join(&source.data_file)
    }

    pub fn index_path(&self, source: &SourceConfig) -> PathBuf {
        self.download_dir.join(&source.index_file)
    }
}

fn default_tls_cooldown() -> Duration {
    Duration::from_secs(5)
}

fn default_throttle_cooldown() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_retry_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_batch_size() -> usize {
    100
}

fn default_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("data/download")
}

fn default_app_list_file() -> String {
    "app_list.csv".to_string()
}

fn default_sources() -> BTreeMap<String, SourceConfig> {
    let fast = Duration::from_millis(300);
    BTreeMap::from([
        ("steam".to_string(), {
            let mut steam = SourceConfig::new("steam", default_pause());
            steam.data_file = "steam_app_data.csv".to_string();
            steam
        }),
        ("steamspy".to_string(), SourceConfig::new("steamspy", fast)),
        (
            "steamspy-html".to_string(),
            SourceConfig::new("steamspy_extended", fast),
        ),
        ("steamcharts".to_string(), SourceConfig::new("steamcharts", fast)),
    ])
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
