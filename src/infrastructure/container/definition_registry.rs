use super::definition::Definition;
use super::types::Type;
use crate::errors::ContainerError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Entries {
    by_name: HashMap<String, Arc<Definition>>,
    order: Vec<String>,
}

/// Name-keyed store of definitions.
///
/// Read-mostly: additions normally happen while bootstrapping, lookups
/// afterwards. Registration order is kept and drives every by-type query.
#[derive(Default)]
pub struct DefinitionRegistry {
    entries: RwLock<Entries>,
    allow_overriding: bool,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that replaces a definition registered under an existing name
    /// instead of rejecting it.
    pub fn with_overriding(allow_overriding: bool) -> Self {
        Self {
            entries: RwLock::default(),
            allow_overriding,
        }
    }

    pub fn add(&self, definition: Definition) -> Result<(), ContainerError> {
        let name = definition.name().to_string();
        let mut entries = self.entries.write();

        if entries.by_name.contains_key(&name) {
            if !self.allow_overriding {
                return Err(ContainerError::DuplicateDefinition(name));
            }
            warn!(definition = %name, "overriding existing definition");
        } else {
            entries.order.push(name.clone());
        }

        debug!(
            definition = %name,
            produced = %definition.produced_type(),
            scope = %definition.scope(),
            inputs = definition.inputs().len(),
            "definition registered"
        );
        entries.by_name.insert(name, Arc::new(definition));
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<Definition>> {
        self.entries.read().by_name.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().by_name.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of every definition whose produced type matches `ty`, in
    /// registration order.
    pub fn definition_names_by_type(&self, ty: &Type) -> Vec<String> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter(|name| {
                entries
                    .by_name
                    .get(name.as_str())
                    .is_some_and(|definition| definition.produced_type().matches(ty))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {}

    struct Widget;
    impl Named for Widget {}

    struct Gadget;
    impl Named for Gadget {}

    fn widget_type() -> Type {
        Type::builder::<Widget>()
            .implements::<dyn Named>(|w| w as Arc<dyn Named>)
            .build()
    }

    fn gadget_type() -> Type {
        Type::builder::<Gadget>()
            .implements::<dyn Named>(|g| g as Arc<dyn Named>)
            .build()
    }

    fn widget(name: &str) -> Definition {
        Definition::builder(name, widget_type())
            .constructor(|_| Ok(Widget))
            .build()
            .unwrap()
    }

    #[test]
    fn test_add_and_find() {
        let registry = DefinitionRegistry::new();
        registry.add(widget("widget")).unwrap();

        assert!(registry.contains("widget"));
        assert_eq!(registry.find("widget").unwrap().name(), "widget");
        assert!(registry.find("gadget").is_none());
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let registry = DefinitionRegistry::new();
        registry.add(widget("widget")).unwrap();

        let result = registry.add(widget("widget"));
        assert!(matches!(result, Err(ContainerError::DuplicateDefinition(name)) if name == "widget"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_overriding_replaces_in_place() {
        let registry = DefinitionRegistry::with_overriding(true);
        registry.add(widget("first")).unwrap();
        registry.add(widget("second")).unwrap();

        let replacement = Definition::builder("first", gadget_type())
            .prototype()
            .constructor(|_| Ok(Gadget))
            .build()
            .unwrap();
        registry.add(replacement).unwrap();

        assert_eq!(registry.names(), vec!["first", "second"]);
        assert!(registry.find("first").unwrap().is_prototype());
    }

    #[test]
    fn test_names_by_type_in_registration_order() {
        let registry = DefinitionRegistry::new();
        registry.add(widget("b-widget")).unwrap();
        registry
            .add(
                Definition::builder("gadget", gadget_type())
                    .constructor(|_| Ok(Gadget))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry.add(widget("a-widget")).unwrap();

        assert_eq!(
            registry.definition_names_by_type(&Type::of::<Widget>()),
            vec!["b-widget", "a-widget"]
        );
        assert_eq!(
            registry.definition_names_by_type(&Type::interface::<dyn Named>()),
            vec!["b-widget", "gadget", "a-widget"]
        );
        assert!(registry
            .definition_names_by_type(&Type::of::<String>())
            .is_empty());
    }
}
