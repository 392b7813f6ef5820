//! Component scanning: hands discovered candidates to the processors the
//! container knows about.

use crate::errors::ContainerError;
use crate::infrastructure::condition::{Condition, Environment, Evaluator};
use crate::infrastructure::container::{Container, Definition, Instance, Type};
use crate::logging::OperationTimer;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// A discovered candidate: a definition plus the conditions that gate its
/// registration.
#[derive(Clone)]
pub struct Component {
    name: String,
    definition: Definition,
    conditions: Vec<Arc<dyn Condition>>,
}

impl Component {
    /// Component named after its definition.
    pub fn new(definition: Definition) -> Self {
        Self {
            name: definition.name().to_string(),
            definition,
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

/// Acts on the components it supports.
pub trait ComponentProcessor: Send + Sync {
    fn supports(&self, component: &Component) -> bool;

    fn process(&self, component: &Component) -> anyhow::Result<()>;
}

/// Runs every processor registered in a container over a fixed list of
/// components.
#[derive(Debug, Default)]
pub struct ComponentScanner {
    components: Vec<Component>,
}

impl ComponentScanner {
    pub fn new(components: Vec<Component>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Returns the number of components scanned. Stops at the first
    /// processor failure; failing to obtain a processor is an error too.
    pub fn scan(&self, container: &Container) -> Result<usize, ContainerError> {
        let timer = OperationTimer::new("component_scan")
            .with_metadata("components", &self.components.len().to_string());

        let processors = processor_instances(container)?;
        debug!(processors = processors.len(), "component processors resolved");

        let mut scanned = 0;
        for component in &self.components {
            trace!(component = %component.name(), "scanning component");
            for processor in &processors {
                if processor.supports(component) {
                    processor
                        .process(component)
                        .map_err(|source| ContainerError::Processing {
                            component: component.name().to_string(),
                            source,
                        })?;
                }
            }
            scanned += 1;
        }

        timer.finish();
        Ok(scanned)
    }
}

fn processor_instances(container: &Container) -> Result<Vec<Arc<dyn ComponentProcessor>>, ContainerError> {
    let processor_type = Type::interface::<dyn ComponentProcessor>();
    container
        .get_instances_by_type(&processor_type)?
        .iter()
        .map(|instance: &Instance| {
            instance
                .cast::<dyn ComponentProcessor>()
                .ok_or_else(|| ContainerError::TypeMismatch {
                    name: instance.instance_type().name().to_string(),
                    actual: instance.instance_type().name().to_string(),
                    required: processor_type.name().to_string(),
                })
        })
        .collect()
}

/// Stock processor: registers each component's definition unless its
/// conditions say to skip it.
pub struct DefinitionRegistrar {
    container: Weak<Container>,
    environment: Arc<dyn Environment>,
}

impl DefinitionRegistrar {
    pub const NAME: &'static str = "definitionRegistrar";

    /// Holds the container weakly; the registrar usually lives inside it.
    pub fn new(container: &Arc<Container>, environment: Arc<dyn Environment>) -> Self {
        Self {
            container: Arc::downgrade(container),
            environment,
        }
    }

    /// Definition that makes the registrar discoverable as a
    /// [`ComponentProcessor`].
    pub fn definition(
        container: &Arc<Container>,
        environment: Arc<dyn Environment>,
    ) -> Result<Definition, ContainerError> {
        let container = Arc::downgrade(container);
        Definition::builder(Self::NAME, Type::interface::<dyn ComponentProcessor>())
            .constructor(move |_| {
                Ok(Arc::new(DefinitionRegistrar {
                    container: container.clone(),
                    environment: environment.clone(),
                }) as Arc<dyn ComponentProcessor>)
            })
            .build()
    }
}

impl ComponentProcessor for DefinitionRegistrar {
    fn supports(&self, _component: &Component) -> bool {
        true
    }

    fn process(&self, component: &Component) -> anyhow::Result<()> {
        let container = self
            .container
            .upgrade()
            .ok_or(ContainerError::MissingCollaborator("container"))?;

        let evaluator = Evaluator::builder()
            .container(container.clone())
            .environment(self.environment.clone())
            .build()?;

        if evaluator.should_skip(component.conditions()) {
            debug!(component = %component.name(), "conditions not met, skipping registration");
            return Ok(());
        }

        container.register(component.definition().clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::condition::{OnProperty, StaticEnvironment};

    fn component(name: &str) -> Component {
        Component::new(
            Definition::builder(name, Type::of::<String>())
                .constructor({
                    let value = name.to_string();
                    move |_| Ok(value.clone())
                })
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_scan_without_processors_counts_components() {
        let container = Container::new();
        let scanner = ComponentScanner::new(vec![component("a"), component("b")]);
        assert_eq!(scanner.scan(&container).unwrap(), 2);
        assert!(container.definition_registry().is_empty());
    }

    #[test]
    fn test_registrar_applies_conditions() {
        let container = Arc::new(Container::new());
        let environment: Arc<dyn Environment> =
            Arc::new(StaticEnvironment::new().with_property("feature", "on"));
        container
            .register(DefinitionRegistrar::definition(&container, environment).unwrap())
            .unwrap();

        let scanner = ComponentScanner::new(vec![
            component("enabled").with_condition(OnProperty::equals("feature", "on")),
            component("disabled").with_condition(OnProperty::equals("feature", "off")),
            component("plain"),
        ]);

        assert_eq!(scanner.scan(&container).unwrap(), 3);
        assert!(container.definition_registry().contains("enabled"));
        assert!(!container.definition_registry().contains("disabled"));
        assert!(container.definition_registry().contains("plain"));
        assert_eq!(*container.get("plain").unwrap().downcast::<String>().unwrap(), "plain");
    }

    #[test]
    fn test_registrar_reports_duplicates() {
        let container = Arc::new(Container::new());
        container
            .register(
                DefinitionRegistrar::definition(&container, Arc::new(StaticEnvironment::new()))
                    .unwrap(),
            )
            .unwrap();

        let scanner = ComponentScanner::new(vec![component("twice"), component("twice")]);
        let err = scanner.scan(&container).unwrap_err();
        assert!(matches!(err, ContainerError::Processing { component, .. } if component == "twice"));
    }

    #[test]
    fn test_registrar_without_container() {
        let container = Arc::new(Container::new());
        let registrar = DefinitionRegistrar::new(&container, Arc::new(StaticEnvironment::new()));
        drop(container);

        assert!(registrar.process(&component("orphan")).is_err());
    }
}
