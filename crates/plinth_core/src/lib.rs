//! Plinth Core Engine
//!
//! This crate provides the rendering primitives of the Plinth UI engine:
//!
//! - **Elements**: declarative component, structural and memoized nodes
//! - **Render Contexts**: persistent per-element hook state, mirrored as a tree
//! - **Hooks**: state, refs, memoization, callbacks, effects and resource scopes
//! - **Renderer**: whole-tree passes that either commit or leave no trace
//!
//! # Example
//!
//! ```rust
//! use plinth_core::{BaseElement, Element, Renderer, Session, TreeRenderer, Value};
//!
//! let counter = Element::function("counter", |ctx| {
//!     let (count, set_count) = ctx.use_state(0i64)?;
//!     let increment = ctx.use_callback(
//!         move |_| {
//!             set_count.update(|n| n + 1);
//!             Ok(Value::Null)
//!         },
//!         (),
//!     )?;
//!     Ok(BaseElement::new("Button")
//!         .prop("on_press", increment)
//!         .child(format!("Clicked {count} times"))
//!         .into())
//! });
//!
//! let mut renderer = Renderer::with_session(Session::detached());
//! let node = renderer.render(&counter).unwrap();
//! assert_eq!(node.name(), "counter");
//! ```

pub mod context;
pub mod effect;
pub mod element;
pub mod error;
pub mod hooks;
pub mod liveness;
pub mod node;
pub mod queue;
pub mod renderer;
pub mod value;

pub use context::{EventSink, RenderContext, Session};
pub use effect::{Cleanup, EffectQueue};
pub use element::{wire_prop_name, BaseElement, Element, FunctionElement, MemoizedElement, CHILDREN_PROP};
pub use error::{RenderError, Result};
pub use hooks::{EventSender, Ref, StateSetter};
pub use liveness::{LivenessReferent, LivenessScope};
pub use node::RenderedNode;
pub use queue::{ManualRenderQueue, RenderQueue, RenderTask, SharedRenderQueue, ThreadRenderQueue};
pub use renderer::{Renderer, TreeRenderer};
pub use value::{Callable, CallableFn, CallableId, ObjectId, ObjectRef, Props, Value};
