use serde::Deserialize;
use std::{fs, time::Duration};

use anyhow::Context;
use utility_client::{api::DEFAULT_BASE_URL, DatasetKind};

use crate::transform::DemandPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn token(&self) -> anyhow::Result<String> {
        std::env::var(&self.token_env)
            .with_context(|| format!("provider token variable {} is not set", self.token_env))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    /// Named AWS profile; the default credential chain is used when unset.
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl StorageConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_datasets")]
    pub datasets: Vec<DatasetKind>,
    #[serde(default)]
    pub bills_demand: DemandPolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            datasets: default_datasets(),
            bills_demand: DemandPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ARCHIVE_CONFIG").unwrap_or_else(|_| "archive-config.toml".to_string());
        let contents = fs::read_to_string(&path).with_context(|| format!("reading config file {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("parsing config file {path}"))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_env() -> String {
    "UTILITYAPI_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_datasets() -> Vec<DatasetKind> {
    DatasetKind::ALL.to_vec()
}
