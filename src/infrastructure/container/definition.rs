//! Definitions: named, immutable recipes for building an instance.

use super::types::{Instance, Type, Value};
use crate::errors::ContainerError;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

/// Lifetime policy of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Built once, cached, and returned to every caller.
    #[default]
    Shared,
    /// Built anew for every request and never cached.
    Prototype,
}

impl FromStr for Scope {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" | "singleton" => Ok(Scope::Shared),
            "prototype" => Ok(Scope::Prototype),
            _ => Err(ContainerError::UnknownScope(s.to_string())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Shared => f.write_str("shared"),
            Scope::Prototype => f.write_str("prototype"),
        }
    }
}

/// One declared constructor parameter.
#[derive(Debug, Clone)]
pub struct Input {
    ty: Type,
    name: Option<String>,
    optional: bool,
}

impl Input {
    /// Input resolved by type.
    pub fn of(ty: Type) -> Self {
        Self {
            ty,
            name: None,
            optional: false,
        }
    }

    /// Resolve by name instead of by type.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Resolution failure yields an absent argument instead of an error.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn input_type(&self) -> &Type {
        &self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// Positional arguments handed to a constructor.
#[derive(Debug, Clone, Default)]
pub struct Args {
    slots: Vec<Option<Instance>>,
}

impl Args {
    pub fn new(slots: Vec<Option<Instance>>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The argument at `index`, `None` when absent or out of range.
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, ContainerError> {
        let instance = self.require(index)?;
        instance
            .downcast::<T>()
            .ok_or_else(|| argument_type(index, type_name::<T>(), instance))
    }

    /// Like [`Args::get`], but an absent optional argument is `Ok(None)`.
    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>, ContainerError> {
        match self.instance(index) {
            None => Ok(None),
            Some(instance) => instance
                .downcast::<T>()
                .map(Some)
                .ok_or_else(|| argument_type(index, type_name::<T>(), instance)),
        }
    }

    pub fn cast<I: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<I>, ContainerError> {
        let instance = self.require(index)?;
        instance
            .cast::<I>()
            .ok_or_else(|| argument_type(index, type_name::<I>(), instance))
    }

    pub fn sequence(&self, index: usize) -> Result<&[Instance], ContainerError> {
        let instance = self.require(index)?;
        instance
            .as_sequence()
            .ok_or_else(|| argument_type(index, "a sequence", instance))
    }

    /// Every element of a sequence argument, downcast to `T`.
    pub fn all<T: Any + Send + Sync>(&self, index: usize) -> Result<Vec<Arc<T>>, ContainerError> {
        self.sequence(index)?
            .iter()
            .map(|item| {
                item.downcast::<T>()
                    .ok_or_else(|| argument_type(index, type_name::<T>(), item))
            })
            .collect()
    }

    /// Every element of a sequence argument, viewed as `I`.
    pub fn all_cast<I: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Vec<Arc<I>>, ContainerError> {
        self.sequence(index)?
            .iter()
            .map(|item| {
                item.cast::<I>()
                    .ok_or_else(|| argument_type(index, type_name::<I>(), item))
            })
            .collect()
    }

    fn require(&self, index: usize) -> Result<&Instance, ContainerError> {
        self.instance(index)
            .ok_or(ContainerError::MissingArgument(index))
    }
}

fn argument_type(index: usize, expected: &str, actual: &Instance) -> ContainerError {
    ContainerError::ArgumentType {
        index,
        expected: expected.to_string(),
        actual: actual.instance_type().name().to_string(),
    }
}

/// Factory object invoked by the container with resolved arguments.
pub trait Constructor: Send + Sync {
    /// Number of positional arguments the constructor expects.
    fn arity(&self) -> usize;

    /// `TypeId` of the value the constructor stores in the produced instance.
    fn produced_type_id(&self) -> TypeId;

    fn invoke(&self, args: &Args) -> anyhow::Result<Value>;
}

/// Closure-backed constructor.
pub struct FnConstructor<F, T> {
    factory_fn: F,
    arity: usize,
    _phantom: PhantomData<fn() -> T>,
}

impl<F, T> FnConstructor<F, T> {
    pub fn new(factory_fn: F, arity: usize) -> Self {
        Self {
            factory_fn,
            arity,
            _phantom: PhantomData,
        }
    }
}

impl<F, T> Constructor for FnConstructor<F, T>
where
    F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    fn arity(&self) -> usize {
        self.arity
    }

    fn produced_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn invoke(&self, args: &Args) -> anyhow::Result<Value> {
        let value = (self.factory_fn)(args)?;
        Ok(Arc::new(value))
    }
}

/// Immutable blueprint: name, produced type, scope, constructor and inputs.
#[derive(Clone)]
pub struct Definition {
    name: String,
    produced: Type,
    scope: Scope,
    inputs: Vec<Input>,
    constructor: Arc<dyn Constructor>,
}

impl Definition {
    pub fn builder(name: impl Into<String>, produced: Type) -> DefinitionBuilder {
        DefinitionBuilder::new(name, produced)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn produced_type(&self) -> &Type {
        &self.produced
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn is_shared(&self) -> bool {
        self.scope == Scope::Shared
    }

    pub fn is_prototype(&self) -> bool {
        self.scope == Scope::Prototype
    }

    pub(crate) fn invoke(&self, args: &Args) -> anyhow::Result<Instance> {
        let value = self.constructor.invoke(args)?;
        // custom factories are trusted for arity only
        if Any::type_id(&*value) != self.produced.storage_id() {
            return Err(ContainerError::TypeMismatch {
                name: self.name.clone(),
                actual: "an unexpected value".to_string(),
                required: self.produced.name().to_string(),
            }
            .into());
        }
        Ok(Instance::from_parts(value, self.produced.clone()))
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("type", &self.produced.name())
            .field("scope", &self.scope)
            .field("inputs", &self.inputs)
            .finish()
    }
}

enum PendingConstructor {
    Closure(Box<dyn FnOnce(usize) -> Arc<dyn Constructor>>),
    Factory(Arc<dyn Constructor>),
}

pub struct DefinitionBuilder {
    name: String,
    produced: Type,
    scope: Scope,
    inputs: Vec<Input>,
    constructor: Option<PendingConstructor>,
}

impl DefinitionBuilder {
    pub fn new(name: impl Into<String>, produced: Type) -> Self {
        Self {
            name: name.into(),
            produced,
            scope: Scope::default(),
            inputs: Vec::new(),
            constructor: None,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn shared(self) -> Self {
        self.scope(Scope::Shared)
    }

    pub fn prototype(self) -> Self {
        self.scope(Scope::Prototype)
    }

    pub fn input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = Input>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Constructor closure receiving one argument per declared input.
    ///
    /// `T` must be the stored representation of the produced type: the
    /// concrete type itself, or `Arc<dyn I>` for an interface type.
    pub fn constructor<T, F>(mut self, factory_fn: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.constructor = Some(PendingConstructor::Closure(Box::new(move |arity| {
            Arc::new(FnConstructor::<F, T>::new(factory_fn, arity)) as Arc<dyn Constructor>
        })));
        self
    }

    /// Custom constructor object; its arity must equal the number of inputs.
    pub fn factory(mut self, constructor: Arc<dyn Constructor>) -> Self {
        self.constructor = Some(PendingConstructor::Factory(constructor));
        self
    }

    pub fn build(self) -> Result<Definition, ContainerError> {
        if self.name.trim().is_empty() {
            return Err(invalid(&self.name, "name cannot be empty".to_string()));
        }

        let arity = self.inputs.len();
        let constructor = match self.constructor {
            Some(PendingConstructor::Closure(make)) => make(arity),
            Some(PendingConstructor::Factory(constructor)) => constructor,
            None => return Err(invalid(&self.name, "no constructor given".to_string())),
        };

        if constructor.arity() != arity {
            return Err(invalid(
                &self.name,
                format!(
                    "constructor takes {} arguments but {} inputs are declared",
                    constructor.arity(),
                    arity
                ),
            ));
        }

        if constructor.produced_type_id() != self.produced.storage_id() {
            return Err(invalid(
                &self.name,
                format!("constructor does not produce {}", self.produced.name()),
            ));
        }

        Ok(Definition {
            name: self.name,
            produced: self.produced,
            scope: self.scope,
            inputs: self.inputs,
            constructor,
        })
    }
}

fn invalid(name: &str, reason: String) -> ContainerError {
    ContainerError::InvalidDefinition {
        name: name.to_string(),
        reason,
    }
}
