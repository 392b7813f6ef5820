pub mod container_config;
pub mod loader;

// Re-export commonly used types
pub use container_config::{ContainerConfig, PartialContainerConfig};
pub use loader::ConfigLoader;

impl ContainerConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, crate::errors::ConfigError> {
        ConfigLoader::new().load_config()
    }

    /// Load configuration with custom base path (for testing)
    pub fn load_with_base_path(base_path: std::path::PathBuf) -> Result<Self, crate::errors::ConfigError> {
        ConfigLoader::with_base_path(base_path).load_config()
    }
}
