//! Dynamic values carried in props
//!
//! Props are heterogeneous: plain data, nested elements, callables the client
//! may invoke, and opaque host objects (tables and the like) that can only be
//! referenced on the wire. [`Value`] is the closed set of everything a prop can
//! hold.
//!
//! Callables and opaque objects are tracked by an arena-assigned integer id
//! rather than by pointer identity, so every map keyed by them uses a plain
//! integer key.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::element::Element;
use crate::node::RenderedNode;

/// Ordered prop mapping (insertion order is preserved on the wire)
pub type Props = IndexMap<String, Value>;

/// A prop value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Props),
    /// An element that still has to be rendered
    Element(Element),
    /// An already rendered node
    Node(RenderedNode),
    Callable(Callable),
    Object(ObjectRef),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Props> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&RenderedNode> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Element(_) => "element",
            Value::Node(_) => "node",
            Value::Callable(_) => "callable",
            Value::Object(_) => "object",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Element(a), Value::Element(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Element(element) => fmt::Debug::fmt(element, f),
            Value::Node(node) => fmt::Debug::fmt(node, f),
            Value::Callable(callable) => fmt::Debug::fmt(callable, f),
            Value::Object(object) => fmt::Debug::fmt(object, f),
        }
    }
}

// =========================================================================
// Conversions
// =========================================================================

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(value as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Props> for Value {
    fn from(value: Props) -> Self {
        Value::Map(value)
    }
}

impl From<Element> for Value {
    fn from(value: Element) -> Self {
        Value::Element(value)
    }
}

impl From<RenderedNode> for Value {
    fn from(value: RenderedNode) -> Self {
        Value::Node(value)
    }
}

impl From<Callable> for Value {
    fn from(value: Callable) -> Self {
        Value::Callable(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

// =========================================================================
// Callables
// =========================================================================

static NEXT_CALLABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Arena-assigned identity of a callable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallableId(u64);

impl CallableId {
    fn next() -> Self {
        CallableId(NEXT_CALLABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Function signature of a callable
pub type CallableFn = dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync;

/// A function the client can invoke by id
///
/// Clones share the same [`CallableId`]; two callables built from identical
/// closures are still distinct.
#[derive(Clone)]
pub struct Callable {
    id: CallableId,
    func: Arc<CallableFn>,
}

impl Callable {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            id: CallableId::next(),
            func: Arc::new(func),
        }
    }

    /// A callable that ignores its arguments and returns nothing
    pub fn action<F>(func: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(move |_| {
            func();
            Ok(Value::Null)
        })
    }

    pub fn id(&self) -> CallableId {
        self.id
    }

    /// Invoke the callable with the given arguments
    pub fn call(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.func)(args)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Callable {}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable#{}", self.id.0)
    }
}

// =========================================================================
// Opaque objects
// =========================================================================

/// Identity of an opaque object: the address of the shared host allocation
///
/// Every [`ObjectRef`] wrapping the same `Arc` has the same id. The address
/// cannot be reused while any wrapper is alive, since the wrapper keeps the
/// allocation alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn of(object: &Arc<dyn Any + Send + Sync>) -> Self {
        ObjectId(Arc::as_ptr(object) as *const () as usize as u64)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// A host object that cannot be serialized and is exported by reference
#[derive(Clone)]
pub struct ObjectRef {
    id: ObjectId,
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    /// Wrap a host object, using its Rust type name as the wire type
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self::from_arc(Arc::new(object))
    }

    /// Wrap a host object with an explicit wire type name (e.g. `"Table"`)
    pub fn typed<T: Any + Send + Sync>(object: T, type_name: &'static str) -> Self {
        Self::from_arc(Arc::new(object)).with_type_name(type_name)
    }

    /// Wrap an already shared host object
    ///
    /// Wrapping the same `Arc` again yields an equal reference, so a host can
    /// re-wrap a long-lived table on every render and keep its wire index.
    pub fn from_arc<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        let inner: Arc<dyn Any + Send + Sync> = object;
        Self {
            id: ObjectId::of(&inner),
            type_name: std::any::type_name::<T>(),
            inner,
        }
    }

    pub fn with_type_name(mut self, type_name: &'static str) -> Self {
        self.type_name = type_name;
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object@{:#x}<{}>", self.id.0, self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callable_identity_survives_clone() {
        let a = Callable::action(|| {});
        let b = a.clone();
        let c = Callable::action(|| {});

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Value::from(a.clone()), Value::from(b));
    }

    #[test]
    fn object_identity_is_not_structural() {
        let a = ObjectRef::typed(5u32, "Table");
        let b = ObjectRef::typed(5u32, "Table");

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.downcast_ref::<u32>(), Some(&5));
        assert_eq!(a.type_name(), "Table");
    }

    #[test]
    fn rewrapping_a_shared_object_keeps_its_identity() {
        let table = Arc::new(String::from("positions"));
        let a = ObjectRef::from_arc(table.clone());
        let b = ObjectRef::from_arc(table.clone()).with_type_name("Table");

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, ObjectRef::from_arc(Arc::new(String::from("positions"))));
        assert_eq!(b.downcast::<String>().map(|t| Arc::ptr_eq(&t, &table)), Some(true));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(3u8), Value::Int(3));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }
}
