//! Render error types

use thiserror::Error;

/// Errors raised while rendering an element tree
#[derive(Error, Debug)]
pub enum RenderError {
    /// A function element called a different number of hooks than on its first render
    #[error("hook count mismatch in `{element}` at `{context}`: expected {expected} hook calls, got {actual}")]
    HookCountMismatch {
        element: String,
        context: String,
        expected: usize,
        actual: usize,
    },

    /// A hook slot was read back as a different type than it was created with
    #[error("hook order changed at `{context}`: slot {index} does not hold a {expected}")]
    HookOrderChanged {
        context: String,
        index: usize,
        expected: &'static str,
    },

    /// A hook or context-dependent API was used outside of a render pass
    #[error("`{hook}` called outside of a render pass; {hint}")]
    NoActiveContext { hook: &'static str, hint: &'static str },

    /// A component's render function failed
    #[error("component `{element}` failed to render: {source}")]
    Component {
        element: String,
        #[source]
        source: anyhow::Error,
    },

    /// An effect or effect cleanup failed
    #[error("effect in `{context}` failed: {source}")]
    Effect {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl RenderError {
    pub(crate) fn outside_render(hook: &'static str) -> Self {
        RenderError::NoActiveContext {
            hook,
            hint: "hooks may only be called while the owning component renders; \
                   route deferred work through `use_render_queue`",
        }
    }

    pub(crate) fn missing_session_service(hook: &'static str) -> Self {
        RenderError::NoActiveContext {
            hook,
            hint: "the render session was created without this service; \
                   register it on the root `Session`",
        }
    }

    /// Short machine-readable name of the error kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::HookCountMismatch { .. } => "HookCountMismatch",
            RenderError::HookOrderChanged { .. } => "HookOrderChanged",
            RenderError::NoActiveContext { .. } => "NoActiveContext",
            RenderError::Component { .. } => "ComponentError",
            RenderError::Effect { .. } => "EffectError",
        }
    }

    /// Whether the error invalidates the hook state of the tree
    ///
    /// Fatal errors cannot be recovered by re-rendering: the component itself
    /// breaks the hook rules.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::HookCountMismatch { .. }
                | RenderError::HookOrderChanged { .. }
                | RenderError::NoActiveContext { .. }
        )
    }

    /// Wrap an error returned by user code
    ///
    /// Engine errors that travelled through the user closure via `?` are
    /// returned unchanged.
    pub(crate) fn from_component(element: &str, error: anyhow::Error) -> Self {
        match error.downcast::<RenderError>() {
            Ok(render_error) => render_error,
            Err(source) => RenderError::Component {
                element: element.to_owned(),
                source,
            },
        }
    }
}

/// Result type for render operations
pub type Result<T> = std::result::Result<T, RenderError>;
