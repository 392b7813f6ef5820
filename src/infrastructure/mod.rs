//! 基础设施层
//!
//! 提供容器本身以及围绕它的协作组件：
//! - 依赖注入容器
//! - 条件评估
//! - 组件扫描

// 容器实现
pub mod condition;
pub mod container;
pub mod scanner;

// 重新导出API
pub use condition::{
    Condition, ConditionContext, Environment, Evaluator, EvaluatorBuilder, OnDefinition,
    OnMissingDefinition, OnProperty, StaticEnvironment,
};
pub use container::{Container, Definition, Hook, Input, Instance, Lookup, Scope, Type};
pub use scanner::{Component, ComponentProcessor, ComponentScanner, DefinitionRegistrar};
