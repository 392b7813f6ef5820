use thiserror::Error;

/// Errors raised while registering definitions or resolving instances.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container: either a name or a required type should be given")]
    InvalidRequest,
    #[error("container: a required type should be given")]
    MissingType,
    #[error("container: not found definition with name {0}")]
    DefinitionNotFound(String),
    #[error("container: not found instance or definition with required type {0}")]
    TypeNotFound(String),
    #[error("container: there is more than one definition for the required type {type_name}, it cannot be distinguished: {candidates:?}")]
    Ambiguous {
        type_name: String,
        candidates: Vec<String>,
    },
    #[error("container: definition type with name {name} ({actual}) does not match the required type {required}")]
    TypeMismatch {
        name: String,
        actual: String,
        required: String,
    },
    #[error("container: the number of provided arguments is wrong for definition {name}: expected {expected}, given {given}")]
    ArgumentCount {
        name: String,
        expected: usize,
        given: usize,
    },
    #[error("container: definition with name {0} is already registered")]
    DuplicateDefinition(String),
    #[error("container: instance with name {0} is already registered")]
    DuplicateInstance(String),
    #[error("container: invalid definition {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },
    #[error("container: unknown scope {0}")]
    UnknownScope(String),
    #[error("container: no argument at position {0}")]
    MissingArgument(usize),
    #[error("container: argument at position {index} is {actual}, not {expected}")]
    ArgumentType {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("container: {0} cannot be absent")]
    MissingCollaborator(&'static str),
    #[error(transparent)]
    Constructor(anyhow::Error),
    #[error("container: initialization of {name} failed: {source}")]
    Initialization {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("container: processing component {component} failed: {source}")]
    Processing {
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ContainerError {
    /// True for the conditions where nothing matched a name or a type.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContainerError::DefinitionNotFound(_) | ContainerError::TypeNotFound(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("Other Config Error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ContainerError::DefinitionNotFound("widget".into()).is_not_found());
        assert!(ContainerError::TypeNotFound("Widget".into()).is_not_found());
        assert!(!ContainerError::InvalidRequest.is_not_found());
        assert!(!ContainerError::Ambiguous {
            type_name: "Named".into(),
            candidates: vec!["a".into(), "b".into()],
        }
        .is_not_found());
    }

    #[test]
    fn test_constructor_error_is_transparent() {
        let err = ContainerError::Constructor(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = ContainerError::ArgumentCount {
            name: "widget".into(),
            expected: 2,
            given: 1,
        };
        assert!(err.to_string().contains("widget"));

        let err = ContainerError::Config(ConfigError::InvalidValue {
            key: "WIREBOX_LOG_LEVEL".into(),
            value: "loud".into(),
        });
        assert!(err.to_string().contains("loud"));
    }
}
