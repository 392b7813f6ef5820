pub mod config;
pub mod errors;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::{ConfigLoader, ContainerConfig};
pub use errors::{ConfigError, ContainerError};
pub use infrastructure::container::{
    Args, Container, ContainerStats, Definition, Hook, Input, Instance, Lookup, PostConstruct, Scope,
    Type,
};
