//! Elements: declarative descriptions of what to render
//!
//! The variant set is closed:
//!
//! - [`FunctionElement`] wraps a render closure that may call hooks
//! - [`BaseElement`] is a named node with precomputed props and children
//! - [`MemoizedElement`] wraps another element and skips re-rendering it
//!   while its props compare equal
//!
//! ```ignore
//! use plinth_core::{BaseElement, FunctionElement, Value};
//!
//! let counter = FunctionElement::new("counter", |ctx| {
//!     let (value, set_value) = ctx.use_state(0i64)?;
//!     let increment = ctx.use_callback(
//!         move |_| {
//!             set_value.update(|v| v + 1);
//!             Ok(Value::Null)
//!         },
//!         (),
//!     )?;
//!     Ok(BaseElement::new("Button")
//!         .wire_prop("on_press", increment)
//!         .child(format!("Clicked {value} times"))
//!         .into())
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::RenderContext;
use crate::error::{RenderError, Result};
use crate::value::{Props, Value};

/// Prop key under which children are stored
pub const CHILDREN_PROP: &str = "children";

/// Render closure of a [`FunctionElement`]
pub type RenderFn = dyn Fn(&RenderContext) -> anyhow::Result<Value> + Send + Sync;

/// Equality predicate deciding whether a memoized element can skip rendering
pub type PropsPredicate = dyn Fn(&Props, &Props) -> bool + Send + Sync;

/// A node to render
#[derive(Clone)]
pub enum Element {
    Function(Arc<FunctionElement>),
    Base(Arc<BaseElement>),
    Memoized(Arc<MemoizedElement>),
}

impl Element {
    /// Shorthand for an unkeyed [`FunctionElement`]
    pub fn function<F>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn(&RenderContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        FunctionElement::new(name, render).into()
    }

    pub fn name(&self) -> &str {
        match self {
            Element::Function(element) => &element.name,
            Element::Base(element) => &element.name,
            Element::Memoized(element) => element.inner.name(),
        }
    }

    /// Explicit key identifying this element among its siblings
    pub fn key(&self) -> Option<&str> {
        match self {
            Element::Function(element) => element.key.as_deref(),
            Element::Base(element) => element.key.as_deref(),
            Element::Memoized(element) => element.inner.key(),
        }
    }

    /// Render this element in `ctx`, returning its props
    pub fn render(&self, ctx: &RenderContext) -> Result<Props> {
        match self {
            Element::Function(element) => element.render(ctx),
            Element::Base(element) => Ok(element.render()),
            Element::Memoized(element) => element.render(ctx),
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Element::Function(a), Element::Function(b)) => Arc::ptr_eq(a, b),
            (Element::Base(a), Element::Base(b)) => Arc::ptr_eq(a, b),
            (Element::Memoized(a), Element::Memoized(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Function(element) => fmt::Debug::fmt(element, f),
            Element::Base(element) => fmt::Debug::fmt(element, f),
            Element::Memoized(element) => fmt::Debug::fmt(element, f),
        }
    }
}

// =========================================================================
// Function elements
// =========================================================================

/// A component: a render closure re-invoked on every render
#[derive(Clone)]
pub struct FunctionElement {
    name: String,
    key: Option<String>,
    render: Arc<RenderFn>,
}

impl FunctionElement {
    pub fn new<F>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn(&RenderContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            key: None,
            render: Arc::new(render),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the render closure with `ctx` as the hook store
    ///
    /// The closure's result becomes the `children` prop.
    pub fn render(&self, ctx: &RenderContext) -> Result<Props> {
        ctx.start_render();
        match (self.render)(ctx) {
            Ok(children) => {
                ctx.finish_render(&self.name)?;
                let mut props = Props::with_capacity(1);
                props.insert(CHILDREN_PROP.to_owned(), children);
                Ok(props)
            }
            Err(error) => {
                ctx.abandon_render();
                Err(RenderError::from_component(&self.name, error))
            }
        }
    }
}

impl fmt::Debug for FunctionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionElement")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl From<FunctionElement> for Element {
    fn from(element: FunctionElement) -> Self {
        Element::Function(Arc::new(element))
    }
}

impl From<FunctionElement> for Value {
    fn from(element: FunctionElement) -> Self {
        Value::Element(element.into())
    }
}

// =========================================================================
// Base elements
// =========================================================================

/// A structural node with a name, props and children
#[derive(Clone)]
pub struct BaseElement {
    name: String,
    key: Option<String>,
    props: Props,
}

impl BaseElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            props: Props::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set a prop under `name` as given
    ///
    /// Null values are omitted. Use [`BaseElement::nullable_prop`] for props
    /// whose explicit null is meaningful to the client.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = name.into();
        let value = value.into();
        if value.is_null() {
            self.props.shift_remove(&key);
        } else {
            self.props.insert(key, value);
        }
        self
    }

    /// Set a prop whose snake_case `name` is converted to the camelCase
    /// convention of client components (`on_press` becomes `onPress`)
    pub fn wire_prop(self, name: &str, value: impl Into<Value>) -> Self {
        self.prop(wire_prop_name(name), value)
    }

    /// Set a prop, keeping it even when the value is null
    pub fn nullable_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Append a child
    pub fn child(mut self, child: impl Into<Value>) -> Self {
        let slot = self
            .props
            .entry(CHILDREN_PROP.to_owned())
            .or_insert_with(|| Value::List(Vec::new()));
        match slot {
            Value::List(children) => children.push(child.into()),
            other => {
                let previous = std::mem::take(other);
                *other = Value::List(vec![previous, child.into()]);
            }
        }
        self
    }

    /// Append several children
    pub fn children<I, V>(self, children: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        children.into_iter().fold(self, |element, child| element.child(child))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    fn render(&self) -> Props {
        self.props.clone()
    }
}

impl fmt::Debug for BaseElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseElement")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("props", &self.props)
            .finish()
    }
}

impl From<BaseElement> for Element {
    fn from(element: BaseElement) -> Self {
        Element::Base(Arc::new(element))
    }
}

impl From<BaseElement> for Value {
    fn from(element: BaseElement) -> Self {
        Value::Element(element.into())
    }
}

/// Convert a snake_case prop name to the camelCase wire convention
///
/// Leading underscores and an `UNSAFE_` prefix are kept as-is.
pub fn wire_prop_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("UNSAFE_") {
        return format!("UNSAFE_{}", wire_prop_name(rest));
    }

    let body = name.trim_start_matches('_');
    let mut out = String::with_capacity(name.len());
    out.push_str(&name[..name.len() - body.len()]);

    let mut upper_next = false;
    for ch in body.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

// =========================================================================
// Memoized elements
// =========================================================================

/// Wraps an element and re-renders it only when its props change
#[derive(Clone)]
pub struct MemoizedElement {
    inner: Element,
    props: Props,
    predicate: Option<Arc<PropsPredicate>>,
}

impl MemoizedElement {
    pub fn new(inner: impl Into<Element>, props: Props) -> Self {
        Self {
            inner: inner.into(),
            props,
            predicate: None,
        }
    }

    /// Memoized component whose render closure receives its props
    pub fn component<F>(name: impl Into<String>, props: Props, render: F) -> Self
    where
        F: Fn(&RenderContext, &Props) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let captured = props.clone();
        let inner = FunctionElement::new(name, move |ctx| render(ctx, &captured));
        Self::new(inner, props)
    }

    /// Replace the default equality check (`previous == next`)
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Props, &Props) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn inner(&self) -> &Element {
        &self.inner
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Whether `previous` props allow reusing the last render
    pub fn props_equal(&self, previous: &Props) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(previous, &self.props),
            None => previous == &self.props,
        }
    }

    fn render(&self, ctx: &RenderContext) -> Result<Props> {
        self.inner.render(ctx)
    }
}

impl fmt::Debug for MemoizedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizedElement")
            .field("inner", &self.inner)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

impl From<MemoizedElement> for Element {
    fn from(element: MemoizedElement) -> Self {
        Element::Memoized(Arc::new(element))
    }
}

impl From<MemoizedElement> for Value {
    fn from(element: MemoizedElement) -> Self {
        Value::Element(element.into())
    }
}
