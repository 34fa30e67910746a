//! Hooks
//!
//! Hooks are methods on the [`RenderContext`] handed to a render closure.
//! Each call takes the next slot of the context in call order, so a component
//! must call the same hooks in the same order on every render. Calling a hook
//! while the context is not rendering fails with
//! [`RenderError::NoActiveContext`].
//!
//! ```ignore
//! let list = FunctionElement::new("list", |ctx| {
//!     let (filter, set_filter) = ctx.use_state(String::new())?;
//!     let visible = ctx.use_memo(|| expensive_filter(&filter), filter.clone())?;
//!     ctx.use_effect(
//!         move || {
//!             tracing::info!(rows = visible_len, "filter applied");
//!             Ok(None)
//!         },
//!         filter.clone(),
//!     )?;
//!     Ok(render_rows(visible, set_filter))
//! });
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{EventSink, RenderContext, WeakContext};
use crate::effect::{Cleanup, EffectCell, QueuedEffect, SharedEffectCell};
use crate::error::{RenderError, Result};
use crate::liveness::LivenessScope;
use crate::queue::SharedRenderQueue;
use crate::value::{Callable, Value};

// =========================================================================
// State
// =========================================================================

/// Writes a `use_state` value and schedules a re-render
///
/// Setters are `Send + Sync` and may be used from any thread. Setting a value
/// equal to the current one does nothing.
pub struct StateSetter<T> {
    cell: Arc<Mutex<T>>,
    context: WeakContext,
}

impl<T: PartialEq> StateSetter<T> {
    /// Store `value`; returns whether it differed from the current value
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.cell.lock();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.context.notify_change();
        true
    }

    /// Derive the next value from the current one
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let changed = {
            let mut current = self.cell.lock();
            let next = f(&current);
            if next == *current {
                false
            } else {
                *current = next;
                true
            }
        };
        if changed {
            self.context.notify_change();
        }
        changed
    }
}

impl<T: Clone> StateSetter<T> {
    /// Current value, including updates not yet rendered
    pub fn get(&self) -> T {
        self.cell.lock().clone()
    }
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            context: self.context.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("value", &*self.cell.lock())
            .finish()
    }
}

// =========================================================================
// Refs
// =========================================================================

/// Mutable cell that persists across renders without triggering them
pub struct Ref<T> {
    cell: Arc<Mutex<T>>,
}

impl<T> Ref<T> {
    pub fn set(&self, value: T) {
        *self.cell.lock() = value;
    }

    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.cell.lock(), value)
    }

    /// Run `f` with the stored value
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.cell.lock())
    }
}

impl<T: Clone> Ref<T> {
    pub fn get(&self) -> T {
        self.cell.lock().clone()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&*self.cell.lock()).finish()
    }
}

// =========================================================================
// Events
// =========================================================================

/// Sends named events to the client
#[derive(Clone)]
pub struct EventSender {
    sink: Arc<EventSink>,
}

impl EventSender {
    pub fn send(&self, name: &str, params: impl Into<Value>) -> anyhow::Result<()> {
        (self.sink)(name, params.into())
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSender")
    }
}

// =========================================================================
// Hook slots
// =========================================================================

/// Slot of a `use_effect` call
struct EffectSlot<D> {
    cell: SharedEffectCell,
    /// Dependencies of the last committed run
    deps: Arc<Mutex<Option<D>>>,
}

impl<D> Clone for EffectSlot<D> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            deps: self.deps.clone(),
        }
    }
}

impl RenderContext {
    /// State that survives re-renders; setting it re-renders the tree
    pub fn use_state<T>(&self, initial: T) -> Result<(T, StateSetter<T>)>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        self.use_state_with(move || initial)
    }

    /// Like [`RenderContext::use_state`], computing the initial value lazily
    pub fn use_state_with<T, F>(&self, init: F) -> Result<(T, StateSetter<T>)>
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnOnce() -> T,
    {
        let cell = self.next_slot("use_state", || Arc::new(Mutex::new(init())))?;
        let value = cell.lock().clone();
        Ok((
            value,
            StateSetter {
                cell,
                context: self.downgrade(),
            },
        ))
    }

    pub fn use_ref<T>(&self, initial: T) -> Result<Ref<T>>
    where
        T: Send + 'static,
    {
        let cell = self.next_slot("use_ref", || Arc::new(Mutex::new(initial)))?;
        Ok(Ref { cell })
    }

    /// Cache the result of `f` until `deps` changes
    pub fn use_memo<V, D, F>(&self, f: F, deps: D) -> Result<V>
    where
        V: Clone + Send + 'static,
        D: PartialEq + Send + 'static,
        F: FnOnce() -> V,
    {
        let last_deps = self.use_ref::<Option<D>>(None)?;
        let last_value = self.use_ref::<Option<V>>(None)?;

        let cached = last_deps.with(|previous| previous.as_ref() == Some(&deps));
        if cached {
            if let Some(value) = last_value.get() {
                return Ok(value);
            }
        }

        let value = f();
        last_deps.set(Some(deps));
        last_value.set(Some(value.clone()));
        Ok(value)
    }

    /// A callable whose identity stays the same while `deps` is unchanged
    pub fn use_callback<F, D>(&self, f: F, deps: D) -> Result<Callable>
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
        D: PartialEq + Send + 'static,
    {
        self.use_memo(move || Callable::new(f), deps)
    }

    /// Run `effect` after the pass commits, on first mount and whenever `deps`
    /// changes
    ///
    /// A cleanup returned by the effect runs before the next run and when the
    /// component unmounts.
    pub fn use_effect<F, D>(&self, effect: F, deps: D) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<Option<Cleanup>> + Send + 'static,
        D: PartialEq + Send + 'static,
    {
        self.schedule_effect("use_effect", effect, Some(deps))
    }

    /// Run `effect` after every committed render of this component
    pub fn use_effect_always<F>(&self, effect: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<Option<Cleanup>> + Send + 'static,
    {
        self.schedule_effect::<F, ()>("use_effect_always", effect, None)
    }

    fn schedule_effect<F, D>(&self, hook: &'static str, effect: F, deps: Option<D>) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<Option<Cleanup>> + Send + 'static,
        D: PartialEq + Send + 'static,
    {
        let slot: EffectSlot<D> = self.next_slot(hook, || {
            let cell: SharedEffectCell = Arc::new(Mutex::new(EffectCell::default()));
            self.track_effect(cell.clone());
            EffectSlot {
                cell,
                deps: Arc::new(Mutex::new(None)),
            }
        })?;

        let changed = match &deps {
            None => true,
            Some(deps) => slot.deps.lock().as_ref() != Some(deps),
        };
        if !changed {
            return Ok(());
        }

        let deps_slot = slot.deps.clone();
        self.queue_effect(QueuedEffect {
            cell: slot.cell,
            effect: Box::new(effect),
            commit_deps: Box::new(move || {
                if deps.is_some() {
                    *deps_slot.lock() = deps;
                }
            }),
        });
        Ok(())
    }

    /// A callable that runs `f` with a fresh [`LivenessScope`]
    ///
    /// Resources managed by `f` stay alive until the render pass following the
    /// call has been superseded, so results handed back to the client can
    /// still be referenced by the next document.
    pub fn use_liveness_scope<F, D>(&self, f: F, deps: D) -> Result<Callable>
    where
        F: Fn(&mut LivenessScope, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
        D: PartialEq + Send + 'static,
    {
        let context = self.downgrade();
        self.use_callback(
            move |args| {
                let mut scope = LivenessScope::new();
                let result = f(&mut scope, args);
                match context.upgrade() {
                    Some(ctx) => ctx.adopt_scope(scope),
                    None => {
                        scope.release();
                    }
                }
                result
            },
            deps,
        )
    }

    /// Queue used to marshal work back onto the render thread
    pub fn use_render_queue(&self) -> Result<SharedRenderQueue> {
        self.ensure_rendering("use_render_queue")?;
        self.session()
            .render_queue()
            .cloned()
            .ok_or_else(|| RenderError::missing_session_service("use_render_queue"))
    }

    /// Sender for client events
    pub fn use_send_event(&self) -> Result<EventSender> {
        self.ensure_rendering("use_send_event")?;
        self.session()
            .event_sink()
            .cloned()
            .map(|sink| EventSender { sink })
            .ok_or_else(|| RenderError::missing_session_service("use_send_event"))
    }
}
