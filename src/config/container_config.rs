use crate::errors::ConfigError;
use crate::logging::{LogFormat, LoggingConfig, LoggingEnvironment};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::Level;

// Environment variable names
pub const ENV_ALLOW_OVERRIDING: &str = "WIREBOX_ALLOW_OVERRIDING";
pub const ENV_EAGER_INIT: &str = "WIREBOX_EAGER_INIT";
pub const ENV_LOG_LEVEL: &str = "WIREBOX_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "WIREBOX_LOG_FORMAT";

/// Main container configuration
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// Replace a definition registered under an existing name instead of
    /// rejecting it
    pub allow_definition_overriding: bool,
    /// Build every shared definition when the container starts
    pub eager_init: bool,
    pub logging: LoggingConfig,
    /// Flat key/value properties, visible to conditions
    pub properties: HashMap<String, String>,
}

/// Partial container configuration for loading from files
#[derive(Deserialize, Debug, Default)]
pub struct PartialContainerConfig {
    pub container: Option<PartialContainerSection>,
    pub logging: Option<PartialLoggingSection>,
    #[serde(default)]
    pub properties: HashMap<String, toml::Value>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PartialContainerSection {
    pub allow_definition_overriding: Option<bool>,
    pub eager_init: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PartialLoggingSection {
    /// "development", "production" or "testing"; picks the preset
    pub environment: Option<String>,
    pub level: Option<String>,
    pub format: Option<String>,
}

impl ContainerConfig {
    /// Create ContainerConfig from partial config and environment.
    /// Environment values win over file values.
    pub fn from_partial_and_env(
        partial: Option<PartialContainerConfig>,
        env_map: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let partial = partial.unwrap_or_default();
        let section = partial.container.unwrap_or_default();

        let allow_definition_overriding = match env_map.get(ENV_ALLOW_OVERRIDING) {
            Some(value) => parse_bool(ENV_ALLOW_OVERRIDING, value)?,
            None => section.allow_definition_overriding.unwrap_or(false),
        };

        let eager_init = match env_map.get(ENV_EAGER_INIT) {
            Some(value) => parse_bool(ENV_EAGER_INIT, value)?,
            None => section.eager_init.unwrap_or(false),
        };

        let logging = logging_from_partial(partial.logging.unwrap_or_default(), env_map)?;

        let properties = partial
            .properties
            .into_iter()
            .map(|(key, value)| (key, property_value(value)))
            .collect();

        Ok(Self {
            allow_definition_overriding,
            eager_init,
            logging,
            properties,
        })
    }
}

fn logging_from_partial(
    partial: PartialLoggingSection,
    env_map: &HashMap<String, String>,
) -> Result<LoggingConfig, ConfigError> {
    let mut logging = match partial.environment.as_deref() {
        None => LoggingConfig::default(),
        Some(environment) => match parse_environment(environment)? {
            LoggingEnvironment::Development => LoggingConfig::development(),
            LoggingEnvironment::Production => LoggingConfig::production(),
            LoggingEnvironment::Testing => LoggingConfig::testing(),
        },
    };

    if let Some(level) = env_map.get(ENV_LOG_LEVEL).or(partial.level.as_ref()) {
        logging.level = Level::from_str(level.trim()).map_err(|_| ConfigError::InvalidValue {
            key: "logging.level".to_string(),
            value: level.clone(),
        })?;
    }

    if let Some(format) = env_map.get(ENV_LOG_FORMAT).or(partial.format.as_ref()) {
        logging.format = format.parse::<LogFormat>()?;
    }

    Ok(logging)
}

fn parse_environment(value: &str) -> Result<LoggingEnvironment, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "development" | "dev" => Ok(LoggingEnvironment::Development),
        "production" | "prod" => Ok(LoggingEnvironment::Production),
        "testing" | "test" => Ok(LoggingEnvironment::Testing),
        _ => Err(ConfigError::InvalidValue {
            key: "logging.environment".to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

// Strings are taken verbatim; everything else in its TOML spelling.
fn property_value(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(content: &str) -> Option<PartialContainerConfig> {
        Some(toml::from_str(content).unwrap())
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = ContainerConfig::from_partial_and_env(None, &HashMap::new()).unwrap();
        assert!(!config.allow_definition_overriding);
        assert!(!config.eager_init);
        assert_eq!(config.logging.level, Level::INFO);
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_file_values() {
        let config = ContainerConfig::from_partial_and_env(
            partial(
                r#"
                [container]
                allow_definition_overriding = true
                eager_init = true

                [logging]
                environment = "production"
                level = "warn"

                [properties]
                "cache.enabled" = "on"
                "pool.size" = 8
                "#,
            ),
            &HashMap::new(),
        )
        .unwrap();

        assert!(config.allow_definition_overriding);
        assert!(config.eager_init);
        assert_eq!(config.logging.environment, LoggingEnvironment::Production);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, Level::WARN);
        assert_eq!(config.properties.get("cache.enabled").map(String::as_str), Some("on"));
        assert_eq!(config.properties.get("pool.size").map(String::as_str), Some("8"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut env_map = HashMap::new();
        env_map.insert(ENV_EAGER_INIT.to_string(), "no".to_string());
        env_map.insert(ENV_LOG_LEVEL.to_string(), "trace".to_string());
        env_map.insert(ENV_LOG_FORMAT.to_string(), "compact".to_string());

        let config = ContainerConfig::from_partial_and_env(
            partial("[container]\neager_init = true\n[logging]\nlevel = \"error\"\n"),
            &env_map,
        )
        .unwrap();

        assert!(!config.eager_init);
        assert_eq!(config.logging.level, Level::TRACE);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_values() {
        let mut env_map = HashMap::new();
        env_map.insert(ENV_ALLOW_OVERRIDING.to_string(), "maybe".to_string());
        let result = ContainerConfig::from_partial_and_env(None, &env_map);
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == ENV_ALLOW_OVERRIDING));

        let result = ContainerConfig::from_partial_and_env(
            partial("[logging]\nlevel = \"loud\"\n"),
            &HashMap::new(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = ContainerConfig::from_partial_and_env(
            partial("[logging]\nenvironment = \"staging\"\n"),
            &HashMap::new(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
