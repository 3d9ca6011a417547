//! beacon.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeaconConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    /// Wait before regenerating after an id collision.
    #[serde(default = "default_collision_backoff_ms")]
    pub collision_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Authenticate a freshly provisioned pair before handing it out.
    #[serde(default = "default_true")]
    pub provision_verify: bool,
}

fn default_database_name() -> String {
    "beacon.redb".to_string()
}

fn default_collision_backoff_ms() -> u64 {
    3_000
}

fn default_true() -> bool {
    true
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            collision_backoff_ms: default_collision_backoff_ms(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provision_verify: true,
        }
    }
}

impl CredentialsConfig {
    pub fn collision_backoff(&self) -> Duration {
        Duration::from_millis(self.collision_backoff_ms)
    }
}

impl BeaconConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BeaconConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Full path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database_name)
    }

    /// Scaffold a minimal beacon.toml rooted at `data_dir`.
    pub fn scaffold(data_dir: &Path) -> Self {
        BeaconConfig {
            storage: StorageConfig {
                data_dir: data_dir.to_path_buf(),
                database_name: default_database_name(),
            },
            credentials: CredentialsConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}
