//! The resolution and instantiation engine.
//!
//! 解决以下问题：
//! - 按名称或按类型解析，并检测歧义
//! - 共享实例在并发首次访问时只构造一次
//! - 集合依赖、可选依赖与零值回退
//! - 构造前后的拦截器流水线

use super::definition::{Args, Definition, Input, Scope};
use super::definition_registry::DefinitionRegistry;
use super::hooks::Hooks;
use super::instance_registry::InstanceRegistry;
use super::types::{Instance, Type};
use crate::config::ContainerConfig;
use crate::errors::ContainerError;
use crate::logging::OperationTimer;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, trace};

/// What to resolve: a name, a required type, or both, plus optional
/// override arguments.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    name: Option<String>,
    required_type: Option<Type>,
    args: Vec<Instance>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    pub fn by_type(ty: Type) -> Self {
        Self::new().with_type(ty)
    }

    /// An empty name is treated as no name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.required_type = Some(ty);
        self
    }

    /// Override arguments; they bypass automatic input resolution.
    pub fn with_args(mut self, args: impl IntoIterator<Item = Instance>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn required_type(&self) -> Option<&Type> {
        self.required_type.as_ref()
    }

    pub fn args(&self) -> &[Instance] {
        &self.args
    }
}

/// 内部容器统计信息（原子计数器）
#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    constructions: AtomicUsize,
}

/// 容器统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    pub total_resolutions: usize,
    /// Shared lookups answered from the instance registry
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Constructor invocations, both scopes
    pub constructions: usize,
}

impl ContainerStats {
    /// 获取缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// IoC container: owns one definition registry, one instance registry and
/// one hook chain.
///
/// All operations are synchronous. Share a container between threads with
/// `Arc<Container>`.
pub struct Container {
    definitions: DefinitionRegistry,
    instances: InstanceRegistry,
    hooks: Hooks,
    eager_init: bool,
    stats: InnerStats,
}

impl Container {
    pub fn new() -> Self {
        Self::with_config(&ContainerConfig::default())
    }

    pub fn with_config(config: &ContainerConfig) -> Self {
        debug!(
            allow_definition_overriding = config.allow_definition_overriding,
            eager_init = config.eager_init,
            "creating container"
        );
        Self {
            definitions: DefinitionRegistry::with_overriding(config.allow_definition_overriding),
            instances: InstanceRegistry::new(),
            hooks: Hooks::new(),
            eager_init: config.eager_init,
            stats: InnerStats::default(),
        }
    }

    pub fn get(&self, name: &str) -> Result<Instance, ContainerError> {
        self.get_instance(Some(name), None, &[])
    }

    pub fn get_by_type(&self, ty: &Type) -> Result<Instance, ContainerError> {
        self.get_instance(None, Some(ty), &[])
    }

    pub fn get_by_name_and_type(&self, name: &str, ty: &Type) -> Result<Instance, ContainerError> {
        self.get_instance(Some(name), Some(ty), &[])
    }

    /// Resolves `name`, building it from `args` instead of resolved inputs.
    /// For a shared definition the arguments only matter on first build.
    pub fn get_by_name_and_args(&self, name: &str, args: &[Instance]) -> Result<Instance, ContainerError> {
        self.get_instance(Some(name), None, args)
    }

    /// Every built or buildable instance matching `ty`: live instances first
    /// in registration order, then one per remaining matching definition in
    /// definition registration order.
    pub fn get_instances_by_type(&self, ty: &Type) -> Result<Vec<Instance>, ContainerError> {
        self.get_instances(ty)
    }

    pub fn resolve(&self, lookup: &Lookup) -> Result<Instance, ContainerError> {
        self.get_instance(lookup.name(), lookup.required_type(), lookup.args())
    }

    pub fn resolve_all(&self, lookup: &Lookup) -> Result<Vec<Instance>, ContainerError> {
        let ty = lookup.required_type().ok_or(ContainerError::MissingType)?;
        self.get_instances(ty)
    }

    /// Shorthand for `definition_registry().add(definition)`.
    pub fn register(&self, definition: Definition) -> Result<(), ContainerError> {
        self.definitions.add(definition)
    }

    /// Whether an instance named `name` is live.
    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains(name)
    }

    pub fn is_shared(&self, name: &str) -> bool {
        self.definitions
            .find(name)
            .is_some_and(|definition| definition.is_shared())
    }

    pub fn is_prototype(&self, name: &str) -> bool {
        self.definitions
            .find(name)
            .is_some_and(|definition| definition.is_prototype())
    }

    pub fn definition_registry(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    pub fn instance_registry(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// 获取容器统计信息
    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            total_resolutions: self.stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            constructions: self.stats.constructions.load(Ordering::Relaxed),
        }
    }

    /// Builds every shared definition that has no live instance yet, in
    /// registration order. Stops at the first failure.
    pub fn pre_instantiate_shared(&self) -> Result<usize, ContainerError> {
        let timer = OperationTimer::new("pre_instantiate_shared");
        let mut built = 0;

        for name in self.definitions.names() {
            if !self.is_shared(&name) || self.instances.contains(&name) {
                continue;
            }
            self.get(&name)?;
            built += 1;
        }

        timer
            .with_metadata("built", &built.to_string())
            .finish();
        Ok(built)
    }

    /// Completes bootstrapping: pre-instantiates shared definitions when the
    /// container was configured for eager initialization.
    pub fn start(&self) -> Result<(), ContainerError> {
        if self.eager_init {
            let built = self.pre_instantiate_shared()?;
            info!(built, "container started with eager initialization");
        } else {
            info!(definitions = self.definitions.len(), "container started");
        }
        Ok(())
    }

    fn get_instance(
        &self,
        name: Option<&str>,
        required: Option<&Type>,
        args: &[Instance],
    ) -> Result<Instance, ContainerError> {
        self.stats.total_resolutions.fetch_add(1, Ordering::Relaxed);

        let name = match (name.filter(|name| !name.is_empty()), required) {
            (None, None) => return Err(ContainerError::InvalidRequest),
            (Some(name), _) => name.to_string(),
            (None, Some(ty)) => {
                if let Ok(existing) = self.instances.find_by_type(ty) {
                    trace!(required = %ty, "resolved from live instances");
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(existing);
                }
                self.unique_definition_name(ty)?
            }
        };

        let definition = match self.definitions.find(&name) {
            Some(definition) => definition,
            None => return self.registered_instance(&name, required, args),
        };

        if let Some(required) = required {
            if !definition.produced_type().matches(required) {
                return Err(ContainerError::TypeMismatch {
                    name,
                    actual: definition.produced_type().name().to_string(),
                    required: required.name().to_string(),
                });
            }
        }

        match definition.scope() {
            Scope::Shared => {
                if let Some(existing) = self.instances.find(&name) {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(existing);
                }
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                self.instances
                    .or_else_get(&name, || self.create_instance(&definition, args))
            }
            Scope::Prototype => self.create_instance(&definition, args),
        }
    }

    fn unique_definition_name(&self, ty: &Type) -> Result<String, ContainerError> {
        let mut names = self.definitions.definition_names_by_type(ty);
        match names.len() {
            0 => Err(ContainerError::TypeNotFound(ty.name().to_string())),
            1 => Ok(names.remove(0)),
            _ => Err(ContainerError::Ambiguous {
                type_name: ty.name().to_string(),
                candidates: names,
            }),
        }
    }

    // Instances registered from outside have no definition behind them.
    fn registered_instance(
        &self,
        name: &str,
        required: Option<&Type>,
        args: &[Instance],
    ) -> Result<Instance, ContainerError> {
        let instance = match self.instances.find(name) {
            Some(instance) if args.is_empty() => instance,
            _ => return Err(ContainerError::DefinitionNotFound(name.to_string())),
        };

        if let Some(required) = required {
            if !instance.instance_type().matches(required) {
                return Err(ContainerError::TypeMismatch {
                    name: name.to_string(),
                    actual: instance.instance_type().name().to_string(),
                    required: required.name().to_string(),
                });
            }
        }

        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        Ok(instance)
    }

    fn create_instance(&self, definition: &Definition, args: &[Instance]) -> Result<Instance, ContainerError> {
        let expected = definition.inputs().len();

        let args = if args.is_empty() {
            self.resolve_inputs(definition)?
        } else if args.len() == expected {
            Args::new(args.iter().cloned().map(Some).collect())
        } else {
            return Err(ContainerError::ArgumentCount {
                name: definition.name().to_string(),
                expected,
                given: args.len(),
            });
        };

        debug!(
            definition = %definition.name(),
            scope = %definition.scope(),
            "constructing instance"
        );
        self.stats.constructions.fetch_add(1, Ordering::Relaxed);

        let instance = definition.invoke(&args).map_err(constructor_error)?;
        self.initialize_instance(definition.name(), instance)
    }

    fn resolve_inputs(&self, definition: &Definition) -> Result<Args, ContainerError> {
        let slots = definition
            .inputs()
            .iter()
            .map(|input| self.resolve_input(definition.name(), input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Args::new(slots))
    }

    fn resolve_input(&self, owner: &str, input: &Input) -> Result<Option<Instance>, ContainerError> {
        let ty = input.input_type();

        if ty.is_sequence() {
            if let Some(elem) = ty.elem() {
                let items = self.get_instances(elem)?;
                return ty.collect(items).map(Some);
            }
        }

        let resolved = match input.name() {
            Some(name) => self.get_instance(Some(name), Some(ty), &[]),
            None => self.get_instance(None, Some(ty), &[]),
        };

        match resolved {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_not_found() && !ty.is_reference() && ty.is_instantiable() => {
                debug!(definition = %owner, input = %ty, "injecting zero value");
                Ok(ty.instantiate())
            }
            Err(err) if input.is_optional() => {
                debug!(definition = %owner, input = %ty, error = %err, "optional input left absent");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // A definition whose name is live is skipped even when the live instance
    // no longer matches `elem`, e.g. after a hook replaced it.
    fn get_instances(&self, elem: &Type) -> Result<Vec<Instance>, ContainerError> {
        let (live, live_names) = self.instances.snapshot_by_type(elem);

        let mut pending = Vec::new();
        for name in self.definitions.definition_names_by_type(elem) {
            if !live_names.contains(&name) {
                pending.push(self.get(&name)?);
            }
        }

        trace!(
            elem = %elem,
            live = live.len(),
            built = pending.len(),
            "collection resolved"
        );

        Ok(live.into_iter().chain(pending).collect())
    }

    fn initialize_instance(&self, name: &str, instance: Instance) -> Result<Instance, ContainerError> {
        let hooks = self.hooks.snapshot();
        let mut instance = instance;

        for hook in &hooks {
            if let Some(pre) = hook.on_pre_initialization() {
                trace!(instance = %name, "pre-initialization hook");
                instance = pre(name, instance).map_err(|source| initialization_error(name, source))?;
            }
        }

        if let Some(post_construct) = instance.instance_type().initializer() {
            trace!(instance = %name, "post-construct");
            post_construct(instance.value()).map_err(|source| initialization_error(name, source))?;
        }

        for hook in &hooks {
            if let Some(post) = hook.on_post_initialization() {
                trace!(instance = %name, "post-initialization hook");
                instance = post(name, instance).map_err(|source| initialization_error(name, source))?;
            }
        }

        Ok(instance)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.definitions.len())
            .field("instances", &self.instances.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Constructor failures surface unchanged; a `ContainerError` raised by a
/// nested lookup inside a constructor keeps its kind.
fn constructor_error(err: anyhow::Error) -> ContainerError {
    match err.downcast::<ContainerError>() {
        Ok(container_error) => container_error,
        Err(other) => ContainerError::Constructor(other),
    }
}

/// Hook and post-construct failures; container errors keep their kind here
/// too, anything else is attributed to the instance being initialized.
fn initialization_error(name: &str, source: anyhow::Error) -> ContainerError {
    match source.downcast::<ContainerError>() {
        Ok(container_error) => container_error,
        Err(source) => ContainerError::Initialization {
            name: name.to_string(),
            source,
        },
    }
}
