//! Conditional registration: decides whether a candidate definition is
//! registered at all.

use crate::config::ContainerConfig;
use crate::errors::ContainerError;
use crate::infrastructure::container::Container;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Read-only source of configuration properties.
pub trait Environment: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;

    fn contains_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }
}

/// Map-backed environment.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    properties: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ContainerConfig) -> Self {
        Self {
            properties: config.properties.clone(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticEnvironment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Environment for StaticEnvironment {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// What a condition gets to look at.
pub struct ConditionContext<'a> {
    container: &'a Container,
    environment: &'a dyn Environment,
}

impl<'a> ConditionContext<'a> {
    pub fn new(container: &'a Container, environment: &'a dyn Environment) -> Self {
        Self {
            container,
            environment,
        }
    }

    pub fn container(&self) -> &Container {
        self.container
    }

    pub fn environment(&self) -> &dyn Environment {
        self.environment
    }
}

pub trait Condition: Send + Sync {
    fn matches(&self, ctx: &ConditionContext<'_>) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    fn matches(&self, ctx: &ConditionContext<'_>) -> bool {
        self(ctx)
    }
}

/// Matches when a property is present and, if a value is given, equal to it.
#[derive(Debug, Clone)]
pub struct OnProperty {
    key: String,
    value: Option<String>,
}

impl OnProperty {
    pub fn present(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

impl Condition for OnProperty {
    fn matches(&self, ctx: &ConditionContext<'_>) -> bool {
        match (ctx.environment().property(&self.key), &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == *expected,
        }
    }
}

/// Matches when a definition with the given name is registered.
#[derive(Debug, Clone)]
pub struct OnDefinition(pub String);

impl Condition for OnDefinition {
    fn matches(&self, ctx: &ConditionContext<'_>) -> bool {
        ctx.container().definition_registry().contains(&self.0)
    }
}

/// Matches when no definition with the given name is registered.
#[derive(Debug, Clone)]
pub struct OnMissingDefinition(pub String);

impl Condition for OnMissingDefinition {
    fn matches(&self, ctx: &ConditionContext<'_>) -> bool {
        !ctx.container().definition_registry().contains(&self.0)
    }
}

/// Evaluates condition lists against one container and one environment.
#[derive(Clone)]
pub struct Evaluator {
    container: Arc<Container>,
    environment: Arc<dyn Environment>,
}

impl Evaluator {
    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::default()
    }

    /// `true` when the owning definition must not be registered: the list is
    /// non-empty and at least one condition does not match.
    pub fn should_skip(&self, conditions: &[Arc<dyn Condition>]) -> bool {
        if conditions.is_empty() {
            return false;
        }

        let ctx = ConditionContext::new(&self.container, self.environment.as_ref());
        let skip = !conditions.iter().all(|condition| condition.matches(&ctx));
        trace!(conditions = conditions.len(), skip, "conditions evaluated");
        skip
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct EvaluatorBuilder {
    container: Option<Arc<Container>>,
    environment: Option<Arc<dyn Environment>>,
}

impl EvaluatorBuilder {
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn build(self) -> Result<Evaluator, ContainerError> {
        Ok(Evaluator {
            container: self
                .container
                .ok_or(ContainerError::MissingCollaborator("container"))?,
            environment: self
                .environment
                .ok_or(ContainerError::MissingCollaborator("environment"))?,
        })
    }
}
