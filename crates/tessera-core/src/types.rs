//! Static type descriptors and type-erased instances.
//!
//! Capabilities are matched by *capability type*. Every type that takes part
//! in matching is described by a `static` [`TypeInfo`]: its identity string,
//! its kind, an optional base class, the interfaces it implements and, for
//! closed generic types, the open generic definition it was built from.
//!
//! Values travel through the registry as [`Instance`]s: an `Arc<dyn Any>`
//! tagged with the `TypeInfo` it was registered as. An instance can be
//! *viewed as* any type in its hierarchy; viewing as an interface runs the
//! matching [`Upcast`] which re-wraps the value as an `Arc<dyn Trait>`.
//!
//! # Declaring types
//!
//! ```rust,ignore
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! pub static GREETER: TypeInfo = TypeInfo::interface("demo::Greeter");
//!
//! static ENGLISH_INTERFACES: [Upcast; 1] =
//!     [Upcast::new(&GREETER, upcast!(English => dyn Greeter))];
//! pub static ENGLISH: TypeInfo = TypeInfo::class("demo::English")
//!     .implements(&ENGLISH_INTERFACES);
//!
//! impl Typed for English {
//!     fn type_info() -> TypeRef {
//!         &ENGLISH
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Reference to a static type descriptor.
pub type TypeRef = &'static TypeInfo;

/// Lazily resolved type reference, used inside signatures so that they can
/// be built in `static` initializers.
pub type TypeFn = fn() -> TypeRef;

/// Type-erased shared value.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Converts a type-erased value into an interface view of itself.
pub type CastFn = fn(&AnyArc) -> Option<AnyArc>;

// =============================================================================
// Signatures
// =============================================================================

/// Parameter and return types of a function type.
///
/// Two signatures are equal when they have the same arity, pairwise equal
/// parameter types and equal return types.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    params: &'static [TypeFn],
    ret: TypeFn,
}

impl Signature {
    pub const fn new(params: &'static [TypeFn], ret: TypeFn) -> Self {
        Self { params, ret }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.params.iter().map(|param| param())
    }

    pub fn return_type(&self) -> TypeRef {
        (self.ret)()
    }

    /// Whether any parameter or the return type is an open generic definition.
    pub fn is_open(&self) -> bool {
        self.params()
            .chain(std::iter::once(self.return_type()))
            .any(|ty| matches!(ty.kind(), TypeKind::GenericDefinition))
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.arity() == other.arity()
            && self.return_type() == other.return_type()
            && self.params().zip(other.params()).all(|(a, b)| a == b)
    }
}

impl Eq for Signature {}

// =============================================================================
// Type descriptors
// =============================================================================

/// What kind of type a [`TypeInfo`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// The universal type every other type is assignable to.
    Any,
    /// A concrete type, optionally extending a base class.
    Class,
    /// An interface (a trait object view).
    Interface,
    /// A function type with a fixed signature.
    Function(Signature),
    /// An open generic definition such as `Factory<_>`.
    GenericDefinition,
}

/// An interface implemented by a type, together with the conversion that
/// produces the interface view from a value of that type.
#[derive(Clone, Copy)]
pub struct Upcast {
    pub target: TypeRef,
    pub cast: CastFn,
}

impl Upcast {
    pub const fn new(target: TypeRef, cast: CastFn) -> Self {
        Self { target, cast }
    }
}

impl fmt::Debug for Upcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Upcast").field(&self.target.name).finish()
    }
}

/// Static description of a capability type.
///
/// Identity is the type name: two descriptors with the same name are the
/// same type.
#[derive(Debug)]
pub struct TypeInfo {
    name: &'static str,
    kind: TypeKind,
    base: Option<TypeRef>,
    interfaces: &'static [Upcast],
    generic_definition: Option<TypeRef>,
}

impl TypeInfo {
    const fn with_kind(name: &'static str, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            base: None,
            interfaces: &[],
            generic_definition: None,
        }
    }

    pub const fn class(name: &'static str) -> Self {
        Self::with_kind(name, TypeKind::Class)
    }

    pub const fn interface(name: &'static str) -> Self {
        Self::with_kind(name, TypeKind::Interface)
    }

    pub const fn function(name: &'static str, signature: Signature) -> Self {
        Self::with_kind(name, TypeKind::Function(signature))
    }

    pub const fn open_generic(name: &'static str) -> Self {
        Self::with_kind(name, TypeKind::GenericDefinition)
    }

    /// Sets the base class.
    pub const fn extends(self, base: TypeRef) -> Self {
        Self {
            base: Some(base),
            ..self
        }
    }

    /// Sets the directly implemented interfaces.
    ///
    /// For an interface this lists its super-interfaces.
    pub const fn implements(self, interfaces: &'static [Upcast]) -> Self {
        Self { interfaces, ..self }
    }

    /// Marks this type as a closed instance of an open generic definition.
    pub const fn instance_of(self, definition: TypeRef) -> Self {
        Self {
            generic_definition: Some(definition),
            ..self
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn base(&self) -> Option<TypeRef> {
        self.base
    }

    pub fn interfaces(&self) -> &'static [Upcast] {
        self.interfaces
    }

    pub fn generic_definition(&self) -> Option<TypeRef> {
        self.generic_definition
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, TypeKind::Function(_))
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.kind {
            TypeKind::Function(signature) => Some(signature),
            _ => None,
        }
    }

    /// Base classes from the most derived to the root.
    pub fn base_types(&self) -> impl Iterator<Item = TypeRef> {
        std::iter::successors(self.base, |ty| ty.base)
    }

    /// Every interface this type is assignable to: its own interfaces and
    /// their super-interfaces first, then those inherited from base classes.
    pub fn all_interfaces(&self) -> Vec<TypeRef> {
        let mut out = Vec::new();
        collect_interfaces(self.interfaces, &mut out);
        for base in self.base_types() {
            collect_interfaces(base.interfaces, &mut out);
        }
        out
    }

    /// Whether `self` is a strict subtype of `other`.
    pub fn is_subtype_of(&self, other: &TypeInfo) -> bool {
        if self == other {
            return false;
        }
        other.is_any()
            || self.base_types().any(|base| base == other)
            || self.all_interfaces().iter().any(|iface| *iface == other)
    }

    /// Whether a value of type `self` can be used where `other` is expected.
    pub fn is_assignable_to(&self, other: &TypeInfo) -> bool {
        self == other || self.is_subtype_of(other)
    }

    /// Finds the conversion chain from a value of this type to `target`.
    ///
    /// Only the type's own interfaces (and their super-interfaces) carry
    /// casts that accept a value of this exact type.
    pub fn find_upcast(&self, target: &TypeInfo) -> Option<Vec<CastFn>> {
        fn walk(interfaces: &'static [Upcast], target: &TypeInfo, path: &mut Vec<CastFn>) -> bool {
            for upcast in interfaces {
                path.push(upcast.cast);
                if upcast.target == target || walk(upcast.target.interfaces, target, path) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        walk(self.interfaces, target, &mut path).then_some(path)
    }
}

fn collect_interfaces(interfaces: &'static [Upcast], out: &mut Vec<TypeRef>) {
    for upcast in interfaces {
        if !out.contains(&upcast.target) {
            out.push(upcast.target);
            collect_interfaces(upcast.target.interfaces, out);
        }
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Built-in types
// =============================================================================

/// The universal type.
pub static ANY: TypeInfo = TypeInfo::with_kind("any", TypeKind::Any);
pub static STRING: TypeInfo = TypeInfo::class("string");
pub static BOOL: TypeInfo = TypeInfo::class("bool");
pub static I32: TypeInfo = TypeInfo::class("i32");
pub static I64: TypeInfo = TypeInfo::class("i64");
pub static F64: TypeInfo = TypeInfo::class("f64");
pub static UNIT: TypeInfo = TypeInfo::class("unit");
pub static JSON: TypeInfo = TypeInfo::class("json");

/// A Rust type with a static capability type descriptor.
pub trait Typed: Any + Send + Sync {
    fn type_info() -> TypeRef;
}

macro_rules! builtin_typed {
    ($($ty:ty => $info:ident),* $(,)?) => {
        $(
            impl Typed for $ty {
                fn type_info() -> TypeRef {
                    &$info
                }
            }
        )*
    };
}

builtin_typed! {
    String => STRING,
    bool => BOOL,
    i32 => I32,
    i64 => I64,
    f64 => F64,
    () => UNIT,
    serde_json::Value => JSON,
}

/// Builds a [`CastFn`] that views a value as a trait object.
///
/// `upcast!(Concrete => dyn Trait)` converts a stored `Concrete`;
/// `upcast!(dyn Sub => dyn Super)` converts a stored `Arc<dyn Sub>` view.
/// The trait must have `Send + Sync` as supertraits.
#[macro_export]
macro_rules! upcast {
    (dyn $from:path => dyn $to:path) => {
        |value: &$crate::AnyArc| -> ::std::option::Option<$crate::AnyArc> {
            let view = value.downcast_ref::<::std::sync::Arc<dyn $from>>()?;
            let target: ::std::sync::Arc<dyn $to> = ::std::sync::Arc::clone(view);
            ::std::option::Option::Some(::std::sync::Arc::new(target))
        }
    };
    ($concrete:ty => $iface:ty) => {
        |value: &$crate::AnyArc| -> ::std::option::Option<$crate::AnyArc> {
            let concrete = ::std::sync::Arc::clone(value).downcast::<$concrete>().ok()?;
            let target: ::std::sync::Arc<$iface> = concrete;
            ::std::option::Option::Some(::std::sync::Arc::new(target))
        }
    };
}

// =============================================================================
// Instances
// =============================================================================

/// A shared, type-erased value tagged with its capability type.
#[derive(Clone)]
pub struct Instance {
    ty: TypeRef,
    value: AnyArc,
}

impl Instance {
    pub fn new<T: Typed>(value: T) -> Self {
        Self {
            ty: T::type_info(),
            value: Arc::new(value),
        }
    }

    /// Wraps `value` under an explicit type tag.
    pub fn with_type<T: Any + Send + Sync>(ty: TypeRef, value: T) -> Self {
        Self {
            ty,
            value: Arc::new(value),
        }
    }

    /// Wraps an interface view; `ty` should be the interface's descriptor.
    pub fn from_view<T: ?Sized + Send + Sync + 'static>(ty: TypeRef, view: Arc<T>) -> Self {
        Self {
            ty,
            value: Arc::new(view),
        }
    }

    pub fn from_arc(ty: TypeRef, value: AnyArc) -> Self {
        Self { ty, value }
    }

    pub fn type_info(&self) -> TypeRef {
        self.ty
    }

    pub fn raw(&self) -> &AnyArc {
        &self.value
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns the trait object view stored by an interface instance.
    pub fn as_dyn<T: ?Sized + 'static>(&self) -> Option<Arc<T>>
    where
        Arc<T>: Any,
    {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    pub fn is_instance_of(&self, ty: &TypeInfo) -> bool {
        self.ty.is_assignable_to(ty)
    }

    /// Views this value as `target`.
    ///
    /// Returns `None` when the value is not assignable to `target` or when no
    /// conversion to the interface is declared on the value's own type.
    pub fn view_as(&self, target: TypeRef) -> Option<Instance> {
        if target.is_any() || self.ty == target {
            return Some(self.clone());
        }
        if !self.ty.is_subtype_of(target) {
            return None;
        }
        if !target.is_interface() {
            return Some(self.retag(target));
        }
        let path = self.ty.find_upcast(target)?;
        let mut value = Arc::clone(&self.value);
        for cast in path {
            value = cast(&value)?;
        }
        Some(Self { ty: target, value })
    }

    /// Same value under a different type tag.
    pub fn retag(&self, ty: TypeRef) -> Instance {
        Self {
            ty,
            value: Arc::clone(&self.value),
        }
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance").field("type", &self.ty.name).finish_non_exhaustive()
    }
}

/// A function handle tagged with a function type.
///
/// The handle is usually a plain `fn` pointer; callers downcast it back to the
/// pointer type matching the signature.
#[derive(Clone, Debug)]
pub struct Callable {
    handle: Instance,
}

impl Callable {
    pub fn new<F: Any + Send + Sync>(ty: TypeRef, handle: F) -> Self {
        Self {
            handle: Instance::with_type(ty, handle),
        }
    }

    pub fn signature(&self) -> Option<&'static Signature> {
        self.handle.ty.signature()
    }

    pub fn into_instance(self) -> Instance {
        self.handle
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub trait Cloner: Send + Sync {
        fn clone_name(&self) -> String;
    }

    pub trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    pub static CLONER: TypeInfo = TypeInfo::interface("test::Cloner");
    pub static NAMED: TypeInfo = TypeInfo::interface("test::Named");

    pub struct Widget(pub &'static str);

    impl Cloner for Widget {
        fn clone_name(&self) -> String {
            self.0.to_owned()
        }
    }

    impl Named for Widget {
        fn name(&self) -> String {
            self.0.to_owned()
        }
    }

    static WIDGET_INTERFACES: [Upcast; 2] = [
        Upcast::new(&CLONER, upcast!(Widget => dyn Cloner)),
        Upcast::new(&NAMED, upcast!(Widget => dyn Named)),
    ];
    pub static BASE_WIDGET: TypeInfo = TypeInfo::class("test::BaseWidget");
    pub static WIDGET: TypeInfo = TypeInfo::class("test::Widget")
        .extends(&BASE_WIDGET)
        .implements(&WIDGET_INTERFACES);

    impl Typed for Widget {
        fn type_info() -> TypeRef {
            &WIDGET
        }
    }

    static STRING_TO_I32_PARAMS: [TypeFn; 1] = [<String as Typed>::type_info];
    pub static STRING_TO_I32: TypeInfo = TypeInfo::function(
        "test::StringToI32",
        Signature::new(&STRING_TO_I32_PARAMS, <i32 as Typed>::type_info),
    );
    pub static PARSE_FN: TypeInfo = TypeInfo::function(
        "test::Parse",
        Signature::new(&STRING_TO_I32_PARAMS, <i32 as Typed>::type_info),
    );

    #[test]
    fn hierarchy_queries() {
        assert!(WIDGET.is_subtype_of(&BASE_WIDGET));
        assert!(WIDGET.is_subtype_of(&CLONER));
        assert!(WIDGET.is_subtype_of(&ANY));
        assert!(!WIDGET.is_subtype_of(&WIDGET));
        assert!(!BASE_WIDGET.is_subtype_of(&WIDGET));
        assert_eq!(WIDGET.base_types().collect::<Vec<_>>(), vec![&BASE_WIDGET]);
        assert_eq!(WIDGET.all_interfaces(), vec![&CLONER, &NAMED]);
    }

    #[test]
    fn signatures_compare_structurally() {
        assert_eq!(STRING_TO_I32.signature(), PARSE_FN.signature());
        assert_ne!(STRING_TO_I32, PARSE_FN);
        assert!(!STRING_TO_I32.signature().is_some_and(Signature::is_open));
    }

    #[test]
    fn view_as_interface_runs_upcast() {
        let instance = Instance::new(Widget("w"));
        let view = instance.view_as(&CLONER).expect("widget implements Cloner");
        assert_eq!(view.type_info(), &CLONER);
        let cloner = view.as_dyn::<dyn Cloner>().expect("view holds Arc<dyn Cloner>");
        assert_eq!(cloner.clone_name(), "w");

        assert!(instance.view_as(&BASE_WIDGET).is_some());
        assert!(instance.view_as(&ANY).is_some_and(|v| v.ptr_eq(&instance)));
        assert!(instance.view_as(&STRING).is_none());
    }

    #[test]
    fn builtin_instances_downcast() {
        let instance = Instance::new("hello".to_owned());
        assert_eq!(instance.type_info(), &STRING);
        assert_eq!(instance.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(instance.downcast::<i32>().is_none());
    }
}
