//! Runtime type descriptors and type-erased instances.
//!
//! Rust has no runtime reflection, so every type the container reasons about
//! is described by a [`Type`] handle: its identity and its kind. What a
//! concrete type can do (the interfaces it converts to, its zero value, its
//! post-construct step) is declared once through [`TypeBuilder`] and kept in
//! a process-wide registry keyed by `TypeId`, so every handle of the same
//! type answers the same way. Values travel as an [`Instance`], which keeps
//! the erased value and its descriptor together.

use crate::errors::ContainerError;
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased instance value.
///
/// Concrete and reference types store `T` itself, interface types store an
/// `Arc<dyn I>` and sequence types store a `Vec<Instance>`.
pub type Value = Arc<dyn Any + Send + Sync>;

type Conversion = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;
type ZeroFn = fn() -> Value;
pub(crate) type InitFn = fn(&Value) -> anyhow::Result<()>;

/// Self-initialization capability, run once right after construction,
/// between the pre- and post-initialization hooks.
pub trait PostConstruct {
    fn post_construct(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A plain value type.
    Concrete,
    /// A shared handle to another type; never zero-instantiated.
    Reference,
    /// A trait object type (`dyn Trait`).
    Interface,
    /// An ordered collection of instances of an element type.
    Sequence,
}

/// Capabilities declared for a concrete type.
#[derive(Default, Clone)]
struct TypeTraits {
    conversions: Vec<(TypeId, Conversion)>,
    zero: Option<ZeroFn>,
    initializer: Option<InitFn>,
}

impl TypeTraits {
    fn merge(&mut self, declared: TypeTraits) {
        for (target, conversion) in declared.conversions {
            match self.conversions.iter_mut().find(|(id, _)| *id == target) {
                Some(slot) => slot.1 = conversion,
                None => self.conversions.push((target, conversion)),
            }
        }
        if declared.zero.is_some() {
            self.zero = declared.zero;
        }
        if declared.initializer.is_some() {
            self.initializer = declared.initializer;
        }
    }
}

lazy_static! {
    static ref TYPE_TRAITS: DashMap<TypeId, TypeTraits> = DashMap::new();
}

struct TypeInfo {
    id: TypeId,
    storage: TypeId,
    name: String,
    kind: TypeKind,
    elem: Option<Type>,
}

/// Descriptor for a type known to the container.
#[derive(Clone)]
pub struct Type(Arc<TypeInfo>);

impl Type {
    /// Descriptor for `T`, carrying whatever has been declared for `T`.
    pub fn of<T: Any + Send + Sync>() -> Type {
        TypeBuilder::<T>::new().build()
    }

    pub fn builder<T: Any + Send + Sync>() -> TypeBuilder<T> {
        TypeBuilder::new()
    }

    /// Descriptor for a trait object type, e.g. `Type::interface::<dyn Named>()`.
    pub fn interface<I: ?Sized + Send + Sync + 'static>() -> Type {
        Type(Arc::new(TypeInfo {
            id: TypeId::of::<I>(),
            storage: TypeId::of::<Arc<I>>(),
            name: type_name::<I>().to_string(),
            kind: TypeKind::Interface,
            elem: None,
        }))
    }

    /// Descriptor for a sequence of `elem` instances.
    pub fn sequence(elem: Type) -> Type {
        Type(Arc::new(TypeInfo {
            id: TypeId::of::<Vec<Instance>>(),
            storage: TypeId::of::<Vec<Instance>>(),
            name: format!("[{}]", elem.name()),
            kind: TypeKind::Sequence,
            elem: Some(elem),
        }))
    }

    /// Reference to this type. Shares the value representation, conversions
    /// and post-construct step, but has no zero value.
    pub fn reference(&self) -> Type {
        Type(Arc::new(TypeInfo {
            id: self.0.id,
            storage: self.0.storage,
            name: format!("&{}", self.0.name),
            kind: TypeKind::Reference,
            elem: Some(self.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.0.id
    }

    pub(crate) fn storage_id(&self) -> TypeId {
        self.0.storage
    }

    pub fn is_reference(&self) -> bool {
        self.0.kind == TypeKind::Reference
    }

    pub fn is_interface(&self) -> bool {
        self.0.kind == TypeKind::Interface
    }

    pub fn is_sequence(&self) -> bool {
        self.0.kind == TypeKind::Sequence
    }

    /// Pointee of a reference or element of a sequence.
    pub fn elem(&self) -> Option<&Type> {
        self.0.elem.as_ref()
    }

    pub fn is_instantiable(&self) -> bool {
        self.zero().is_some()
    }

    /// Fresh zero value, if the type declared one. References never have one.
    pub fn instantiate(&self) -> Option<Instance> {
        self.zero()
            .map(|zero| Instance::from_parts(zero(), self.clone()))
    }

    /// Direct convertibility: same type, or a declared conversion to the
    /// target interface.
    pub fn can_convert(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        target.is_interface() && self.conversion_to(target.0.id).is_some()
    }

    /// Convertibility used for matching definitions and instances: direct
    /// convertibility, or a reference whose pointee converts to a target
    /// that is neither a reference nor an interface.
    pub fn matches(&self, target: &Type) -> bool {
        if self.can_convert(target) {
            return true;
        }
        match (self.kind(), self.elem()) {
            (TypeKind::Reference, Some(pointee))
                if !target.is_reference() && !target.is_interface() =>
            {
                pointee.can_convert(target)
            }
            _ => false,
        }
    }

    /// Appends `items` into a sequence instance of this type. Every item must
    /// match the element type.
    pub fn collect(&self, items: Vec<Instance>) -> Result<Instance, ContainerError> {
        let elem = match (self.kind(), self.elem()) {
            (TypeKind::Sequence, Some(elem)) => elem,
            _ => {
                return Err(ContainerError::TypeMismatch {
                    name: self.name().to_string(),
                    actual: self.name().to_string(),
                    required: "a sequence type".to_string(),
                })
            }
        };

        if let Some(stray) = items.iter().find(|item| !item.instance_type().matches(elem)) {
            return Err(ContainerError::TypeMismatch {
                name: self.name().to_string(),
                actual: stray.instance_type().name().to_string(),
                required: elem.name().to_string(),
            });
        }

        Ok(Instance::from_parts(Arc::new(items), self.clone()))
    }

    pub(crate) fn conversion_to(&self, target: TypeId) -> Option<Conversion> {
        if !self.has_traits() {
            return None;
        }
        let traits = TYPE_TRAITS.get(&self.0.id)?;
        let conversion = traits
            .conversions
            .iter()
            .find(|(id, _)| *id == target)
            .map(|(_, conversion)| conversion.clone());
        conversion
    }

    pub(crate) fn initializer(&self) -> Option<InitFn> {
        if !self.has_traits() {
            return None;
        }
        TYPE_TRAITS.get(&self.0.id)?.initializer
    }

    fn zero(&self) -> Option<ZeroFn> {
        if self.0.kind != TypeKind::Concrete {
            return None;
        }
        TYPE_TRAITS.get(&self.0.id)?.zero
    }

    // Interfaces and sequences never carry declared capabilities.
    fn has_traits(&self) -> bool {
        matches!(self.0.kind, TypeKind::Concrete | TypeKind::Reference)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind == other.0.kind && self.0.id == other.0.id && self.0.elem == other.0.elem
    }
}

impl Eq for Type {}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .finish()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Declares the capabilities of a concrete type.
///
/// Declarations are recorded process-wide on [`TypeBuilder::build`] and add
/// to earlier ones; a repeated conversion to the same interface replaces the
/// previous one.
pub struct TypeBuilder<T> {
    declared: TypeTraits,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeBuilder<T> {
    fn new() -> Self {
        Self {
            declared: TypeTraits::default(),
            _phantom: PhantomData,
        }
    }

    /// Declares that `T` can be used wherever `I` is required.
    ///
    /// ```rust,ignore
    /// let widget = Type::builder::<Widget>()
    ///     .implements::<dyn Named>(|w| w as Arc<dyn Named>)
    ///     .build();
    /// ```
    pub fn implements<I: ?Sized + Send + Sync + 'static>(mut self, upcast: fn(Arc<T>) -> Arc<I>) -> Self {
        let conversion: Conversion = Arc::new(move |value: &Value| {
            let concrete = value.clone().downcast::<T>().ok()?;
            Some(Arc::new(upcast(concrete)) as Value)
        });
        self.declared.conversions.push((TypeId::of::<I>(), conversion));
        self
    }

    /// Lets the container inject `T::default()` when nothing is registered.
    pub fn default_value(mut self) -> Self
    where
        T: Default,
    {
        self.declared.zero = Some(zero_value::<T>);
        self
    }

    pub fn post_construct(mut self) -> Self
    where
        T: PostConstruct,
    {
        self.declared.initializer = Some(run_post_construct::<T>);
        self
    }

    pub fn build(self) -> Type {
        let id = TypeId::of::<T>();
        let TypeBuilder { declared, .. } = self;
        let has_declarations =
            !declared.conversions.is_empty() || declared.zero.is_some() || declared.initializer.is_some();
        if has_declarations {
            TYPE_TRAITS.entry(id).or_default().merge(declared);
        }

        Type(Arc::new(TypeInfo {
            id,
            storage: id,
            name: type_name::<T>().to_string(),
            kind: TypeKind::Concrete,
            elem: None,
        }))
    }
}

fn zero_value<T: Default + Any + Send + Sync>() -> Value {
    Arc::new(T::default())
}

fn run_post_construct<T: PostConstruct + Any + Send + Sync>(value: &Value) -> anyhow::Result<()> {
    match value.downcast_ref::<T>() {
        Some(instance) => instance.post_construct(),
        None => Ok(()),
    }
}

/// A type-erased value together with its descriptor.
#[derive(Clone)]
pub struct Instance {
    value: Value,
    ty: Type,
}

impl Instance {
    /// Wraps a value under `Type::of::<T>()`; conversions declared for `T`
    /// apply.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            ty: Type::of::<T>(),
        }
    }

    /// Wraps a value under an explicit descriptor, checking that it matches
    /// the value's representation.
    pub fn with_type<T: Any + Send + Sync>(value: T, ty: Type) -> Result<Self, ContainerError> {
        if TypeId::of::<T>() != ty.storage_id() {
            return Err(ContainerError::TypeMismatch {
                name: type_name::<T>().to_string(),
                actual: type_name::<T>().to_string(),
                required: ty.name().to_string(),
            });
        }
        Ok(Self {
            value: Arc::new(value),
            ty,
        })
    }

    /// Wraps a trait object under `Type::interface::<I>()`.
    pub fn interface<I: ?Sized + Send + Sync + 'static>(value: Arc<I>) -> Self {
        Self {
            value: Arc::new(value),
            ty: Type::interface::<I>(),
        }
    }

    pub(crate) fn from_parts(value: Value, ty: Type) -> Self {
        Self { value, ty }
    }

    pub fn instance_type(&self) -> &Type {
        &self.ty
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Views the instance as a trait object, either directly (interface
    /// instances) or through a conversion its type declared.
    pub fn cast<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        if let Some(direct) = self.value.downcast_ref::<Arc<I>>() {
            return Some(direct.clone());
        }
        let conversion = self.ty.conversion_to(TypeId::of::<I>())?;
        conversion(&self.value)?.downcast_ref::<Arc<I>>().cloned()
    }

    pub fn as_sequence(&self) -> Option<&[Instance]> {
        self.value
            .downcast_ref::<Vec<Instance>>()
            .map(Vec::as_slice)
    }

    /// Reference identity.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.ty.name())
            .field("addr", &Arc::as_ptr(&self.value).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    #[derive(Debug, Default)]
    struct Widget {
        label: String,
    }

    impl Named for Widget {
        fn name(&self) -> String {
            format!("widget:{}", self.label)
        }
    }

    // Never given any declarations.
    #[derive(Debug, Default)]
    struct Plain;

    #[derive(Default)]
    struct Counted {
        inits: AtomicUsize,
    }

    impl PostConstruct for Counted {
        fn post_construct(&self) -> anyhow::Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn widget_type() -> Type {
        Type::builder::<Widget>()
            .implements::<dyn Named>(|w| w as Arc<dyn Named>)
            .default_value()
            .build()
    }

    #[test]
    fn test_identity_and_conversion() {
        let widget = widget_type();
        let named = Type::interface::<dyn Named>();

        assert_eq!(widget, Type::of::<Widget>());
        assert!(widget.can_convert(&widget));
        assert!(widget.can_convert(&named));
        assert!(!Type::of::<Plain>().can_convert(&named));
        assert!(!named.can_convert(&widget));
        assert!(!widget.can_convert(&Type::of::<String>()));
    }

    #[test]
    fn test_reference_matches_pointee() {
        let widget = widget_type();
        let reference = widget.reference();

        assert!(reference.is_reference());
        assert!(!reference.can_convert(&widget));
        assert!(reference.matches(&widget));
        assert!(reference.matches(&Type::interface::<dyn Named>()));
        assert!(!widget.matches(&reference));
        assert!(!reference.is_instantiable());
    }

    #[test]
    fn test_instantiate_zero_value() {
        let instance = widget_type().instantiate().unwrap();
        let widget = instance.downcast::<Widget>().unwrap();
        assert_eq!(widget.label, "");
        assert!(Type::of::<Plain>().instantiate().is_none());
    }

    #[test]
    fn test_declarations_are_shared_by_every_handle() {
        let declared = widget_type();
        let plain = Type::of::<Widget>();
        let named = Type::interface::<dyn Named>();

        assert_eq!(declared, plain);
        assert_eq!(declared.can_convert(&named), plain.can_convert(&named));
        assert!(plain.is_instantiable());
        assert!(plain.reference().matches(&named));
        assert!(!plain.reference().is_instantiable());
    }

    #[test]
    fn test_cast_through_declared_conversion() {
        widget_type();
        assert_eq!(
            Instance::new(Widget::default()).cast::<dyn Named>().unwrap().name(),
            "widget:"
        );

        let instance = Instance::with_type(
            Widget {
                label: "a".to_string(),
            },
            widget_type(),
        )
        .unwrap();

        let named = instance.cast::<dyn Named>().unwrap();
        assert_eq!(named.name(), "widget:a");
        assert!(Instance::new(Plain).cast::<dyn Named>().is_none());
    }

    #[test]
    fn test_interface_instance() {
        let named: Arc<dyn Named> = Arc::new(Widget {
            label: "b".to_string(),
        });
        let instance = Instance::interface(named);

        assert!(instance.instance_type().is_interface());
        assert_eq!(instance.cast::<dyn Named>().unwrap().name(), "widget:b");
        assert!(instance.downcast::<Widget>().is_none());
    }

    #[test]
    fn test_with_type_rejects_wrong_representation() {
        let result = Instance::with_type(String::from("x"), widget_type());
        assert!(matches!(result, Err(ContainerError::TypeMismatch { .. })));
    }

    #[test]
    fn test_sequence_collect() {
        let seq = Type::sequence(widget_type());
        let items = vec![
            Instance::new(Widget::default()),
            Instance::new(Widget::default()),
        ];
        let collected = seq.collect(items).unwrap();
        assert_eq!(collected.as_sequence().unwrap().len(), 2);
        assert_eq!(collected.instance_type(), &seq);

        let stray = seq.collect(vec![Instance::new(1_u32)]);
        assert!(matches!(stray, Err(ContainerError::TypeMismatch { .. })));
        assert!(widget_type().collect(Vec::new()).is_err());
    }

    #[test]
    fn test_sequence_types_compare_by_element() {
        assert_eq!(
            Type::sequence(Type::of::<Widget>()),
            Type::sequence(Type::of::<Widget>())
        );
        assert_ne!(
            Type::sequence(Type::of::<Widget>()),
            Type::sequence(Type::of::<String>())
        );
    }

    #[test]
    fn test_post_construct_capability() {
        let counted = Type::builder::<Counted>().post_construct().build();
        let instance = Instance::with_type(Counted::default(), counted.clone()).unwrap();

        let init = counted.initializer().unwrap();
        init(instance.value()).unwrap();
        assert_eq!(instance.downcast::<Counted>().unwrap().inits.load(Ordering::SeqCst), 1);
        assert!(Type::of::<Counted>().initializer().is_some());
        assert!(Type::of::<Plain>().initializer().is_none());
    }

    #[test]
    fn test_ptr_eq() {
        let a = Instance::new(Widget::default());
        let b = a.clone();
        let c = Instance::new(Widget::default());
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
