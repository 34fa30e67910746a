//! Rendered output

use std::fmt;
use std::sync::Arc;

use crate::value::{Props, Value};

/// Immutable result of rendering one element
///
/// Children, if any, live in `props["children"]`. Cloning is cheap; a
/// memoized element hands back the very same node on a skipped render.
#[derive(Clone, PartialEq)]
pub struct RenderedNode {
    inner: Arc<NodeData>,
}

#[derive(PartialEq)]
struct NodeData {
    name: String,
    props: Option<Props>,
}

impl RenderedNode {
    pub fn new(name: impl Into<String>, props: Option<Props>) -> Self {
        Self {
            inner: Arc::new(NodeData {
                name: name.into(),
                props,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn props(&self) -> Option<&Props> {
        self.inner.props.as_ref()
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.inner.props.as_ref().and_then(|props| props.get(key))
    }

    pub fn children(&self) -> Option<&Value> {
        self.prop("children")
    }

    /// Whether both handles point at the same rendered node
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for RenderedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("RenderedNode");
        out.field("name", &self.inner.name);
        if let Some(props) = &self.inner.props {
            out.field("props", props);
        }
        out.finish()
    }
}
