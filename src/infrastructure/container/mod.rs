//! 依赖注入容器
//!
//! Definitions describe how to build instances, the registries hold them,
//! and [`Container`] resolves and wires them on demand.

mod definition;
mod definition_registry;
mod engine;
mod hooks;
mod instance_registry;
mod types;

pub use definition::{Args, Constructor, Definition, DefinitionBuilder, FnConstructor, Input, Scope};
pub use definition_registry::DefinitionRegistry;
pub use engine::{Container, ContainerStats, Lookup};
pub use hooks::{Hook, HookFn, Hooks};
pub use instance_registry::InstanceRegistry;
pub use types::{Instance, PostConstruct, Type, TypeBuilder, TypeKind, Value};
