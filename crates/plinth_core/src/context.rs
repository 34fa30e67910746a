//! Render contexts
//!
//! Every rendered element owns a [`RenderContext`]: the persistent store for
//! its hook slots, its child contexts, the resources it keeps alive and the
//! effects it has requested. Contexts form a tree that mirrors the element
//! tree and survives across render passes; a child context that a pass does
//! not visit is unmounted when that pass commits.
//!
//! Contexts are passed explicitly. Hooks are methods on the context handed to
//! a render closure (see [`crate::hooks`]), so there is no ambient "current
//! context" and no thread-local state.
//!
//! # Pass lifecycle
//!
//! ```text
//! begin_pass ─► render ─┬─► commit  (new scope retained, old one released,
//!                       │            effects queued, stale children unmounted)
//!                       └─► abort   (new scope released, old one kept)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::effect::{EffectJob, EffectQueue, QueuedEffect, SharedEffectCell};
use crate::error::{RenderError, Result};
use crate::liveness::{LivenessReferent, LivenessScope};
use crate::node::RenderedNode;
use crate::queue::SharedRenderQueue;
use crate::value::{Props, Value};

/// Sink for named events sent to the client outside of document updates
pub type EventSink = dyn Fn(&str, Value) -> anyhow::Result<()> + Send + Sync;

// =========================================================================
// Session
// =========================================================================

/// Services shared by every context of one render tree
///
/// The root change callback fires whenever any context in the tree reports a
/// state change. It may be invoked from any thread.
pub struct Session {
    on_change: Box<dyn Fn() + Send + Sync>,
    render_queue: Option<SharedRenderQueue>,
    event_sink: Option<Arc<EventSink>>,
}

impl Session {
    pub fn new<F>(on_change: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            on_change: Box::new(on_change),
            render_queue: None,
            event_sink: None,
        }
    }

    /// Session whose change notifications go nowhere
    pub fn detached() -> Self {
        Self::new(|| {})
    }

    pub fn with_render_queue(mut self, queue: SharedRenderQueue) -> Self {
        self.render_queue = Some(queue);
        self
    }

    pub fn with_event_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.event_sink = Some(Arc::new(sink));
        self
    }

    pub fn render_queue(&self) -> Option<&SharedRenderQueue> {
        self.render_queue.as_ref()
    }

    pub(crate) fn event_sink(&self) -> Option<&Arc<EventSink>> {
        self.event_sink.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("render_queue", &self.render_queue.is_some())
            .field("event_sink", &self.event_sink.is_some())
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Context state
// =========================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Rendering,
}

/// Scope being built by an in-flight pass
struct PassState {
    scope: LivenessScope,
    /// Callback scopes handed over at the start of the pass
    adopted: Vec<LivenessScope>,
}

/// Last render of a memoized element
#[derive(Clone)]
struct MemoSnapshot {
    props: Props,
    node: RenderedNode,
}

struct ContextState {
    phase: Phase,
    hook_index: usize,
    /// Hook calls made by the first successful render
    hook_count: Option<usize>,
    slots: Vec<Box<dyn std::any::Any + Send>>,

    children: FxHashMap<String, RenderContext>,
    visited: FxHashSet<String>,

    retained: LivenessScope,
    pass: Option<PassState>,
    pending_scopes: Vec<LivenessScope>,

    queued_effects: Vec<QueuedEffect>,
    effect_cells: Vec<SharedEffectCell>,

    memo: Option<MemoSnapshot>,
}

impl ContextState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            hook_index: 0,
            hook_count: None,
            slots: Vec::new(),
            children: FxHashMap::default(),
            visited: FxHashSet::default(),
            retained: LivenessScope::new(),
            pass: None,
            pending_scopes: Vec::new(),
            queued_effects: Vec::new(),
            effect_cells: Vec::new(),
            memo: None,
        }
    }
}

struct ContextInner {
    path: String,
    parent: Option<Weak<ContextInner>>,
    session: Arc<Session>,
    dirty: AtomicBool,
    mounted: AtomicBool,
    state: Mutex<ContextState>,
}

// =========================================================================
// RenderContext
// =========================================================================

/// Persistent per-element render state
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct RenderContext {
    inner: Arc<ContextInner>,
}

/// Non-owning handle held by state setters and callbacks
#[derive(Clone)]
pub(crate) struct WeakContext(Weak<ContextInner>);

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<RenderContext> {
        self.0.upgrade().map(|inner| RenderContext { inner })
    }

    pub(crate) fn notify_change(&self) {
        if let Some(ctx) = self.upgrade() {
            ctx.notify_change();
        }
    }
}

impl RenderContext {
    /// Root context of a new render tree
    pub fn root(session: Session) -> Self {
        Self::with_session(Arc::new(session), String::new(), None)
    }

    fn with_session(session: Arc<Session>, path: String, parent: Option<Weak<ContextInner>>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                path,
                parent,
                session,
                dirty: AtomicBool::new(false),
                mounted: AtomicBool::new(true),
                state: Mutex::new(ContextState::new()),
            }),
        }
    }

    /// Slash-separated path of child keys from the root
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::Acquire)
    }

    /// Whether this context or one of its descendants changed since its last pass
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Child context for `key`, created on first use
    ///
    /// Requesting a child marks it as part of the current pass; children not
    /// requested again before the pass commits are unmounted.
    pub fn child(&self, key: &str) -> RenderContext {
        let mut state = self.inner.state.lock();
        state.visited.insert(key.to_owned());
        if let Some(child) = state.children.get(key) {
            return child.clone();
        }

        let path = if self.inner.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}/{}", self.inner.path, key)
        };
        let child = Self::with_session(
            self.inner.session.clone(),
            path,
            Some(Arc::downgrade(&self.inner)),
        );
        state.children.insert(key.to_owned(), child.clone());
        child
    }

    /// Whether `key` was already claimed by a child during the current pass
    pub(crate) fn has_visited(&self, key: &str) -> bool {
        self.inner.state.lock().visited.contains(key)
    }

    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    pub fn has_child(&self, key: &str) -> bool {
        self.inner.state.lock().children.contains_key(key)
    }

    /// Hook calls recorded by the first successful render, if any
    pub fn hook_count(&self) -> Option<usize> {
        self.inner.state.lock().hook_count
    }

    /// Report a state change: mark this context and its ancestors dirty and
    /// fire the session's change callback
    ///
    /// Changes reported by an unmounted context are dropped.
    pub fn notify_change(&self) {
        if !self.is_mounted() {
            tracing::trace!(context = %self.inner.path, "change on unmounted context ignored");
            return;
        }

        let mut current = Some(self.inner.clone());
        while let Some(ctx) = current {
            ctx.dirty.store(true, Ordering::Release);
            current = ctx.parent.as_ref().and_then(Weak::upgrade);
        }
        (self.inner.session.on_change)();
    }

    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext(Arc::downgrade(&self.inner))
    }

    /// Keep `referent` alive for as long as this render's output is current
    ///
    /// Only valid while the owning component renders.
    pub fn manage_resource(&self, referent: Arc<dyn LivenessReferent>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Rendering {
            return Err(RenderError::outside_render("manage_resource"));
        }
        match state.pass.as_mut() {
            Some(pass) => pass.scope.manage(referent),
            None => {
                let mut scope = LivenessScope::new();
                scope.manage(referent);
                state.pending_scopes.push(scope);
            }
        }
        Ok(())
    }

    /// Hand a scope created outside of rendering to the next pass
    pub(crate) fn adopt_scope(&self, scope: LivenessScope) {
        if scope.is_empty() {
            return;
        }
        if !self.is_mounted() {
            scope.release();
            return;
        }
        self.inner.state.lock().pending_scopes.push(scope);
    }

    /// Scopes and resources currently kept alive by this context
    pub fn retained_resources(&self) -> usize {
        let state = self.inner.state.lock();
        state.retained.len() + state.pending_scopes.iter().map(LivenessScope::len).sum::<usize>()
    }

    // ---------------------------------------------------------------------
    // Hook bookkeeping
    // ---------------------------------------------------------------------

    pub(crate) fn start_render(&self) {
        let mut state = self.inner.state.lock();
        state.phase = Phase::Rendering;
        state.hook_index = 0;
    }

    pub(crate) fn finish_render(&self, element: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.phase = Phase::Idle;
        let actual = state.hook_index;
        match state.hook_count {
            None => {
                state.hook_count = Some(actual);
                Ok(())
            }
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => {
                tracing::warn!(element, context = %self.inner.path, expected, actual, "hook count changed");
                Err(RenderError::HookCountMismatch {
                    element: element.to_owned(),
                    context: self.inner.path.clone(),
                    expected,
                    actual,
                })
            }
        }
    }

    /// Fail with `NoActiveContext` unless a component is rendering in this context
    pub(crate) fn ensure_rendering(&self, hook: &'static str) -> Result<()> {
        if self.inner.state.lock().phase == Phase::Rendering {
            Ok(())
        } else {
            Err(RenderError::outside_render(hook))
        }
    }

    pub(crate) fn abandon_render(&self) {
        self.inner.state.lock().phase = Phase::Idle;
    }

    /// Value of the next hook slot, creating it with `init` on first use
    ///
    /// `init` runs without the state lock held so it may use the context.
    pub(crate) fn next_slot<S, F>(&self, hook: &'static str, init: F) -> Result<S>
    where
        S: Clone + Send + 'static,
        F: FnOnce() -> S,
    {
        let index = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Rendering {
                return Err(RenderError::outside_render(hook));
            }
            let index = state.hook_index;
            state.hook_index += 1;
            if let Some(slot) = state.slots.get(index) {
                return slot
                    .downcast_ref::<S>()
                    .cloned()
                    .ok_or_else(|| self.order_changed::<S>(index));
            }
            index
        };

        let value = init();
        let mut state = self.inner.state.lock();
        if state.slots.len() != index {
            return Err(self.order_changed::<S>(index));
        }
        state.slots.push(Box::new(value.clone()));
        Ok(value)
    }

    fn order_changed<S>(&self, index: usize) -> RenderError {
        RenderError::HookOrderChanged {
            context: self.inner.path.clone(),
            index,
            expected: std::any::type_name::<S>(),
        }
    }

    pub(crate) fn track_effect(&self, cell: SharedEffectCell) {
        self.inner.state.lock().effect_cells.push(cell);
    }

    pub(crate) fn queue_effect(&self, effect: QueuedEffect) {
        self.inner.state.lock().queued_effects.push(effect);
    }

    // ---------------------------------------------------------------------
    // Memoization
    // ---------------------------------------------------------------------

    /// Node from the last render if it can be reused for `props`
    pub(crate) fn cached_render<F>(&self, reusable: F) -> Option<RenderedNode>
    where
        F: FnOnce(&Props) -> bool,
    {
        if self.is_dirty() {
            return None;
        }
        let snapshot = self.inner.state.lock().memo.clone()?;
        reusable(&snapshot.props).then_some(snapshot.node)
    }

    pub(crate) fn store_render(&self, props: Props, node: RenderedNode) {
        self.inner.state.lock().memo = Some(MemoSnapshot { props, node });
    }

    // ---------------------------------------------------------------------
    // Pass lifecycle
    // ---------------------------------------------------------------------

    /// Start a render pass of this context
    pub(crate) fn begin_pass(&self) {
        let mut state = self.inner.state.lock();
        self.inner.dirty.store(false, Ordering::Release);

        let mut scope = LivenessScope::new();
        if let Some(stale) = state.pass.take() {
            // Output of the unfinished pass may still be in the document
            tracing::warn!(context = %self.inner.path, "previous pass never finished");
            scope.absorb(stale.scope);
            state.pending_scopes.extend(stale.adopted);
        }

        state.visited.clear();
        state.queued_effects.clear();
        let adopted = std::mem::take(&mut state.pending_scopes);
        state.pass = Some(PassState { scope, adopted });
    }

    /// Commit a successful pass of this subtree
    ///
    /// Children are committed before their parent so effects run bottom-up.
    /// Contexts that did not render this pass are left untouched.
    pub(crate) fn commit(&self, queue: &mut EffectQueue) {
        let (live, stale) = {
            let mut state = self.inner.state.lock();
            if state.pass.is_none() {
                return;
            }
            let visited = std::mem::take(&mut state.visited);
            let stale_keys: Vec<String> = state
                .children
                .keys()
                .filter(|key| !visited.contains(*key))
                .cloned()
                .collect();
            let stale: Vec<RenderContext> = stale_keys
                .iter()
                .filter_map(|key| state.children.remove(key))
                .collect();
            let live: Vec<RenderContext> = state.children.values().cloned().collect();
            (live, stale)
        };

        for child in &stale {
            child.unmount(queue);
        }
        for child in &live {
            child.commit(queue);
        }

        let superseded = {
            let mut state = self.inner.state.lock();
            let Some(PassState { mut scope, adopted }) = state.pass.take() else {
                return;
            };
            for callback_scope in adopted {
                scope.absorb(callback_scope);
            }
            let superseded = std::mem::replace(&mut state.retained, scope);

            for effect in state.queued_effects.drain(..) {
                (effect.commit_deps)();
                queue.push(EffectJob::Run {
                    context: self.inner.path.clone(),
                    cell: effect.cell,
                    effect: effect.effect,
                });
            }
            superseded
        };

        let released = superseded.release();
        if released > 0 {
            tracing::trace!(context = %self.inner.path, released, "released superseded resources");
        }
    }

    /// Throw away an unsuccessful pass of this subtree
    ///
    /// Resources retained by the last committed pass stay alive; those taken
    /// by the failed pass are released.
    pub(crate) fn abort(&self) {
        let (children, scope) = {
            let mut state = self.inner.state.lock();
            let Some(pass) = state.pass.take() else {
                return;
            };
            state.phase = Phase::Idle;
            state.queued_effects.clear();
            // The snapshot may belong to the failed pass
            state.memo = None;
            state.pending_scopes.extend(pass.adopted);
            let children: Vec<RenderContext> = state.children.values().cloned().collect();
            (children, pass.scope)
        };

        scope.release();
        for child in &children {
            child.abort();
        }
    }

    /// Tear down this subtree: queue effect cleanups and release resources
    pub(crate) fn unmount(&self, queue: &mut EffectQueue) {
        if !self.inner.mounted.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::trace!(context = %self.inner.path, "unmounting");

        let (children, cells, scopes) = {
            let mut state = self.inner.state.lock();
            let children: Vec<RenderContext> = state.children.drain().map(|(_, child)| child).collect();
            let cells = std::mem::take(&mut state.effect_cells);

            let mut scopes = vec![std::mem::take(&mut state.retained)];
            if let Some(pass) = state.pass.take() {
                scopes.push(pass.scope);
                scopes.extend(pass.adopted);
            }
            scopes.append(&mut state.pending_scopes);

            state.queued_effects.clear();
            state.memo = None;
            (children, cells, scopes)
        };

        for child in &children {
            child.unmount(queue);
        }
        for cell in cells {
            let cleanup = cell.lock().cleanup.take();
            if let Some(cleanup) = cleanup {
                queue.push(EffectJob::Cleanup {
                    context: self.inner.path.clone(),
                    cleanup,
                });
            }
        }
        for scope in scopes {
            scope.release();
        }
    }
}

impl PartialEq for RenderContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("path", &self.inner.path)
            .field("dirty", &self.is_dirty())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}
