//! Tree renderer
//!
//! Turns an [`Element`] tree into a [`RenderedNode`] tree. Each element renders
//! in its own [`RenderContext`], found by the element's key or, failing that,
//! by its position among the parent's props (`children/0`, `label`, ...). The
//! element name is part of the context key so that a different component at
//! the same position starts from fresh state.
//!
//! A pass either commits as a whole or is thrown away as a whole: the output
//! of a failed pass is never observable and the resources retained by the
//! last good pass stay alive.

use crate::context::{RenderContext, Session};
use crate::effect::EffectQueue;
use crate::element::Element;
use crate::error::{RenderError, Result};
use crate::node::RenderedNode;
use crate::value::{Props, Value};

/// Whole-tree rendering strategy
pub trait TreeRenderer: Send {
    /// Render `element` against the persistent context tree
    fn render(&mut self, element: &Element) -> Result<RenderedNode>;

    /// Effect and cleanup failures collected since the last call
    fn take_effect_errors(&mut self) -> Vec<RenderError>;

    /// Tear the tree down, running every pending cleanup
    fn unmount(&mut self) -> Vec<RenderError>;

    /// Root of the context tree
    fn root_context(&self) -> &RenderContext;
}

/// Re-renders the whole tree on every pass, skipping memoized subtrees whose
/// props are unchanged and whose state is clean
pub struct Renderer {
    root: RenderContext,
    passes: u64,
    effect_errors: Vec<RenderError>,
}

impl Renderer {
    pub fn new(root: RenderContext) -> Self {
        Self {
            root,
            passes: 0,
            effect_errors: Vec::new(),
        }
    }

    pub fn with_session(session: Session) -> Self {
        Self::new(RenderContext::root(session))
    }

    /// Number of passes started so far
    pub fn passes(&self) -> u64 {
        self.passes
    }
}

impl TreeRenderer for Renderer {
    fn render(&mut self, element: &Element) -> Result<RenderedNode> {
        self.passes += 1;
        let span = tracing::debug_span!("render_pass", pass = self.passes, root = element.name());
        let _guard = span.enter();

        match render_element(&self.root, element) {
            Ok(node) => {
                let mut effects = EffectQueue::default();
                self.root.commit(&mut effects);
                tracing::trace!(effects = effects.len(), "pass committed");
                self.effect_errors.extend(effects.run());
                Ok(node)
            }
            Err(err) => {
                self.root.abort();
                if err.is_fatal() {
                    tracing::error!(error = %err, "render pass failed");
                } else {
                    tracing::warn!(error = %err, "render pass failed");
                }
                Err(err)
            }
        }
    }

    fn take_effect_errors(&mut self) -> Vec<RenderError> {
        std::mem::take(&mut self.effect_errors)
    }

    fn unmount(&mut self) -> Vec<RenderError> {
        let mut cleanups = EffectQueue::default();
        self.root.unmount(&mut cleanups);
        let mut errors = self.take_effect_errors();
        errors.extend(cleanups.run());
        errors
    }

    fn root_context(&self) -> &RenderContext {
        &self.root
    }
}

fn render_element(ctx: &RenderContext, element: &Element) -> Result<RenderedNode> {
    if let Element::Memoized(memo) = element {
        if let Some(node) = ctx.cached_render(|previous| memo.props_equal(previous)) {
            tracing::trace!(context = ctx.path(), element = element.name(), "memoized render reused");
            return Ok(node);
        }
    }

    ctx.begin_pass();
    let props = element.render(ctx)?;
    let props = render_props(ctx, props, "")?;
    let node = RenderedNode::new(element.name(), (!props.is_empty()).then_some(props));

    if let Element::Memoized(memo) = element {
        ctx.store_render(memo.props().clone(), node.clone());
    }
    Ok(node)
}

fn render_props(ctx: &RenderContext, props: Props, prefix: &str) -> Result<Props> {
    props
        .into_iter()
        .map(|(key, value)| {
            let path = join_path(prefix, &key);
            Ok((key, render_value(ctx, value, &path)?))
        })
        .collect()
}

fn render_value(ctx: &RenderContext, value: Value, path: &str) -> Result<Value> {
    match value {
        Value::Element(element) => {
            let child = ctx.child(&child_key(ctx, &element, path));
            render_element(&child, &element).map(Value::Node)
        }
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| render_value(ctx, item, &join_path(path, &index.to_string())))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Map(map) => render_props(ctx, map, path).map(Value::Map),
        other => Ok(other),
    }
}

/// Context key of a child element
///
/// A key repeated among the children of one parent falls back to the
/// position, so siblings never share state.
fn child_key(ctx: &RenderContext, element: &Element, path: &str) -> String {
    let name = element.name();
    let Some(key) = element.key() else {
        return format!("{path}:{name}");
    };
    let keyed = format!("{key}:{name}");
    if !ctx.has_visited(&keyed) {
        return keyed;
    }
    tracing::warn!(context = ctx.path(), key, element = name, "duplicate sibling key; using position");
    format!("{key}@{path}:{name}")
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BaseElement, FunctionElement};

    #[test]
    fn base_elements_render_to_nodes() {
        let mut renderer = Renderer::with_session(Session::detached());
        let tree: Element = BaseElement::new("Flex")
            .child(BaseElement::new("Text").child("hello"))
            .into();

        let node = renderer.render(&tree).unwrap();
        assert_eq!(node.name(), "Flex");
        let children = node.children().and_then(Value::as_list).unwrap();
        let text = children[0].as_node().unwrap();
        assert_eq!(text.name(), "Text");
        assert_eq!(text.children(), Some(&Value::from(vec!["hello"])));
    }

    #[test]
    fn function_elements_wrap_their_output() {
        let mut renderer = Renderer::with_session(Session::detached());
        let tree = Element::function("greeting", |_| Ok(Value::from("hi")));

        let node = renderer.render(&tree).unwrap();
        assert_eq!(node.name(), "greeting");
        assert_eq!(node.children(), Some(&Value::from("hi")));
    }

    #[test]
    fn positional_children_get_stable_contexts() {
        let mut renderer = Renderer::with_session(Session::detached());
        let tree: Element = BaseElement::new("Flex")
            .child(FunctionElement::new("row", |_| Ok(Value::Null)))
            .child(FunctionElement::new("row", |_| Ok(Value::Null)).with_key("pinned"))
            .into();

        renderer.render(&tree).unwrap();
        let root = renderer.root_context();
        assert!(root.has_child("children/0:row"));
        assert!(root.has_child("pinned:row"));
        assert_eq!(root.child_count(), 2);
    }

    #[test]
    fn empty_base_elements_have_no_props() {
        let mut renderer = Renderer::with_session(Session::detached());
        let node = renderer.render(&BaseElement::new("Divider").into()).unwrap();
        assert!(node.props().is_none());
    }
}
