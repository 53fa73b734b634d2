//! Configuration loading

use anyhow::{Context, Result};
use lockstep_core::{Capability, ModelEntry, ModelTable};
use lockstep_engine::{EngineConfig, LifecycleConfig, ProvisioningConfig};
use lockstep_services::CloudConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Extra entries for the model table
    #[serde(default, rename = "model")]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding connection records
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("lockstep-records.json")
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cloud: self.cloud.clone(),
            provisioning: self.provisioning.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }

    /// Built-in models plus the configured extras
    pub fn model_table(&self) -> ModelTable {
        let mut table = ModelTable::builtin();
        table.extend(self.models.iter().cloned());
        table
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), models = config.models.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save a sample configuration file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        models: vec![ModelEntry {
            model: "KDW02".to_string(),
            capability: Capability::NetworkCapable,
            description: Some("Deadbolt with Wi-Fi module".to_string()),
        }],
        ..Default::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Saved default configuration");
    Ok(())
}
