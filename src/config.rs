use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    /// hourly | daily | never
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Required when `backend` is `postgres`
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Stores, stock, recipes and drivers to load at startup
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn default_max_connections() -> u32 {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            postgres_url: None,
            max_connections: default_max_connections(),
            seed_file: None,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        if config.storage.backend == StorageBackend::Postgres
            && config.storage.postgres_url.is_none()
        {
            anyhow::bail!("storage.postgres_url is required for the postgres backend");
        }
        Ok(config)
    }
}
