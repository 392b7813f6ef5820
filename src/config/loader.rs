use std::{collections::HashMap, env, fs, path::{Path, PathBuf}};
use crate::errors::ConfigError;

use super::container_config::{
    ContainerConfig, PartialContainerConfig, ENV_ALLOW_OVERRIDING, ENV_EAGER_INIT,
    ENV_LOG_FORMAT, ENV_LOG_LEVEL,
};

// Configuration location constants
pub const USER_CONFIG_PATH: &str = "~/.config/wirebox";
pub const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "wirebox";

/// Configuration loader responsible for loading config from files and environment
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default paths
    pub fn new() -> Self {
        Self { base_path: None }
    }

    /// Create a config loader with custom base path (for testing)
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self { base_path: Some(base_path) }
    }

    /// Load complete container configuration. A missing file yields defaults.
    pub fn load_config(&self) -> Result<ContainerConfig, ConfigError> {
        let config_path = self.config_path();
        tracing::debug!(path = %config_path.display(), "loading container configuration");

        // Load partial config from file
        let partial_config = self.load_partial_config(&config_path)?;

        // Collect environment variables
        let env_map = self.collect_env_vars();

        ContainerConfig::from_partial_and_env(partial_config, &env_map)
    }

    /// Path of the configuration file this loader reads.
    ///
    /// `~/.config/wirebox/config.toml` when it exists; otherwise the
    /// platform configuration directory (which is the same place on Linux).
    pub fn config_path(&self) -> PathBuf {
        let user_path = self.extract_file_path(USER_CONFIG_PATH, CONFIG_FILE_NAME);
        if self.base_path.is_some() || user_path.exists() {
            return user_path;
        }

        match dirs::config_dir() {
            Some(dir) => dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME),
            None => user_path,
        }
    }

    /// Extract file path with tilde expansion and base path override
    fn extract_file_path(&self, base_dir: &str, file_name: &str) -> PathBuf {
        let expanded_base = if let Some(base_path) = &self.base_path {
            // For testing: use custom base path
            base_path.join(base_dir.trim_start_matches("~/"))
        } else {
            // Normal operation: expand tilde
            let expanded = shellexpand::tilde(base_dir);
            PathBuf::from(expanded.as_ref())
        };

        expanded_base.join(file_name)
    }

    /// Load partial configuration from TOML file
    pub fn load_partial_config(&self, config_path: &Path) -> Result<Option<PartialContainerConfig>, ConfigError> {
        if !config_path.exists() {
            tracing::info!("配置文件 {} 不存在，将使用默认配置", config_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            ConfigError::FileRead(config_path.to_string_lossy().to_string(), e)
        })?;

        let partial_config: PartialContainerConfig = toml::from_str(&content).map_err(|e| {
            ConfigError::TomlParse(config_path.to_string_lossy().to_string(), e)
        })?;

        Ok(Some(partial_config))
    }

    /// Collect relevant environment variables
    pub fn collect_env_vars(&self) -> HashMap<String, String> {
        let env_keys = [
            ENV_ALLOW_OVERRIDING,
            ENV_EAGER_INIT,
            ENV_LOG_LEVEL,
            ENV_LOG_FORMAT,
        ];

        let mut env_map = HashMap::new();
        for key in &env_keys {
            if let Ok(value) = env::var(key) {
                env_map.insert(key.to_string(), value);
            }
        }
        env_map
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
