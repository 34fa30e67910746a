//! Integration tests for render passes
//!
//! These tests verify that:
//! - Hook order and count are enforced across renders
//! - Effects run after commit, once per dependency change, with cleanups
//! - Resources stay alive across passes and are released exactly once
//! - Memoized subtrees are skipped while their props and state are unchanged
//! - Children that disappear from the tree are unmounted

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use plinth_core::{
    BaseElement, Cleanup, Element, FunctionElement, LivenessReferent, MemoizedElement, Props,
    RenderError, RenderedNode, Renderer, Session, StateSetter, TreeRenderer, Value,
};

/// Host resource that records whether its count ever dropped to zero
#[derive(Default)]
struct Table {
    refs: AtomicI64,
    hit_zero: AtomicBool,
}

impl Table {
    fn refs(&self) -> i64 {
        self.refs.load(Ordering::SeqCst)
    }
}

impl LivenessReferent for Table {
    fn retain(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.hit_zero.store(true, Ordering::SeqCst);
        }
    }
}

fn renderer() -> Renderer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Renderer::with_session(Session::detached())
}

fn child_node(node: &RenderedNode, index: usize) -> RenderedNode {
    node.children()
        .and_then(Value::as_list)
        .and_then(|children| children.get(index))
        .and_then(Value::as_node)
        .cloned()
        .expect("rendered child node")
}

#[test]
fn test_hook_count_change_is_fatal() {
    let extra_hook = Arc::new(AtomicBool::new(false));
    let flag = extra_hook.clone();
    let element = Element::function("flaky", move |ctx| {
        ctx.use_state(0i32)?;
        if flag.load(Ordering::SeqCst) {
            ctx.use_ref(())?;
        }
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    renderer.render(&element).unwrap();
    renderer.render(&element).unwrap();

    extra_hook.store(true, Ordering::SeqCst);
    let err = renderer.render(&element).unwrap_err();
    match &err {
        RenderError::HookCountMismatch {
            element,
            expected,
            actual,
            ..
        } => {
            assert_eq!(element, "flaky");
            assert_eq!((*expected, *actual), (1, 2));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());
}

#[test]
fn test_component_error_is_recoverable() {
    let failing = Arc::new(AtomicBool::new(false));
    let flag = failing.clone();
    let element = Element::function("report", move |ctx| {
        let (count, _) = ctx.use_state(7i64)?;
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("query failed");
        }
        Ok(count.into())
    });

    let mut renderer = renderer();
    renderer.render(&element).unwrap();

    failing.store(true, Ordering::SeqCst);
    let err = renderer.render(&element).unwrap_err();
    assert_eq!(err.kind(), "ComponentError");
    assert!(!err.is_fatal());

    failing.store(false, Ordering::SeqCst);
    let node = renderer.render(&element).unwrap();
    assert_eq!(node.children(), Some(&Value::Int(7)));
}

#[test]
fn test_effect_runs_once_and_cleans_up_on_unmount() {
    let runs = Arc::new(AtomicUsize::new(0));
    let cleanups = Arc::new(AtomicUsize::new(0));
    let (r, c) = (runs.clone(), cleanups.clone());
    let element = Element::function("subscriber", move |ctx| {
        let (r, c) = (r.clone(), c.clone());
        ctx.use_effect(
            move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Cleanup::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })))
            },
            (),
        )?;
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    for _ in 0..3 {
        renderer.render(&element).unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);

    assert!(renderer.unmount().is_empty());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_effect_reruns_when_deps_change() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let setter: Arc<Mutex<Option<StateSetter<i32>>>> = Arc::default();

    let (l, s) = (log.clone(), setter.clone());
    let element = Element::function("watcher", move |ctx| {
        let (value, set_value) = ctx.use_state(1)?;
        *s.lock() = Some(set_value);
        let log = l.clone();
        ctx.use_effect(
            move || {
                log.lock().push(format!("run {value}"));
                let log = log.clone();
                Ok(Some(Cleanup::new(move || log.lock().push(format!("cleanup {value}")))))
            },
            value,
        )?;
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    renderer.render(&element).unwrap();
    renderer.render(&element).unwrap();
    setter.lock().as_ref().unwrap().set(2);
    renderer.render(&element).unwrap();

    assert_eq!(*log.lock(), vec!["run 1", "cleanup 1", "run 2"]);
}

#[test]
fn test_failed_pass_does_not_run_effects() {
    let runs = Arc::new(AtomicUsize::new(0));
    let failing = Arc::new(AtomicBool::new(true));
    let (r, f) = (runs.clone(), failing.clone());
    let element = Element::function("guarded", move |ctx| {
        let r = r.clone();
        ctx.use_effect(
            move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
            (),
        )?;
        if f.load(Ordering::SeqCst) {
            anyhow::bail!("not yet");
        }
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    assert!(renderer.render(&element).is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    failing.store(false, Ordering::SeqCst);
    renderer.render(&element).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_effects_run_children_first() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let child_order = order.clone();
    let child = FunctionElement::new("child", move |ctx| {
        let order = child_order.clone();
        ctx.use_effect_always(move || {
            order.lock().push("child");
            Ok(None)
        })?;
        Ok(Value::Null)
    });

    let parent_order = order.clone();
    let parent = Element::function("parent", move |ctx| {
        let order = parent_order.clone();
        ctx.use_effect_always(move || {
            order.lock().push("parent");
            Ok(None)
        })?;
        Ok(child.clone().into())
    });

    let mut renderer = renderer();
    renderer.render(&parent).unwrap();
    assert_eq!(*order.lock(), vec!["child", "parent"]);
}

#[test]
fn test_effect_errors_are_collected() {
    let element = Element::function("broken", |ctx| {
        ctx.use_effect(|| anyhow::bail!("subscribe failed"), ())?;
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    let node = renderer.render(&element).unwrap();
    assert_eq!(node.name(), "broken");

    let errors = renderer.take_effect_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), "EffectError");
    assert!(renderer.take_effect_errors().is_empty());
}

#[test]
fn test_resources_survive_overlapping_passes() {
    let table = Arc::new(Table::default());
    let failing = Arc::new(AtomicBool::new(false));
    let (t, f) = (table.clone(), failing.clone());
    let element = Element::function("table_view", move |ctx| {
        ctx.manage_resource(t.clone())?;
        if f.load(Ordering::SeqCst) {
            anyhow::bail!("render failed after retaining");
        }
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    renderer.render(&element).unwrap();
    assert_eq!(table.refs(), 1);

    renderer.render(&element).unwrap();
    assert_eq!(table.refs(), 1);

    failing.store(true, Ordering::SeqCst);
    assert!(renderer.render(&element).is_err());
    assert_eq!(table.refs(), 1);

    failing.store(false, Ordering::SeqCst);
    renderer.render(&element).unwrap();
    assert_eq!(table.refs(), 1);
    assert!(!table.hit_zero.load(Ordering::SeqCst));

    renderer.unmount();
    assert_eq!(table.refs(), 0);
    assert!(table.hit_zero.load(Ordering::SeqCst));
}

#[test]
fn test_callback_scope_is_retained_until_superseded() {
    let table = Arc::new(Table::default());
    let callback: Arc<Mutex<Option<plinth_core::Callable>>> = Arc::default();

    let (t, cb) = (table.clone(), callback.clone());
    let element = Element::function("snapshot", move |ctx| {
        let t = t.clone();
        let snapshot = ctx.use_liveness_scope(
            move |scope, _args| {
                scope.manage(t.clone());
                Ok(Value::Null)
            },
            (),
        )?;
        *cb.lock() = Some(snapshot);
        Ok(Value::Null)
    });

    let mut renderer = renderer();
    renderer.render(&element).unwrap();

    let snapshot = callback.lock().clone().unwrap();
    snapshot.call(Vec::new()).unwrap();
    assert_eq!(table.refs(), 1);

    // Adopted by the next pass
    renderer.render(&element).unwrap();
    assert_eq!(table.refs(), 1);

    // Superseded by a pass that did not reference it
    renderer.render(&element).unwrap();
    assert_eq!(table.refs(), 0);
}

#[test]
fn test_siblings_with_the_same_key_keep_separate_state() {
    let table = Arc::new(Table::default());

    let t = table.clone();
    let first = FunctionElement::new("row", move |ctx| {
        let (label, _) = ctx.use_state("A".to_owned())?;
        ctx.manage_resource(t.clone())?;
        Ok(label.into())
    })
    .with_key("k");
    let second = FunctionElement::new("row", |ctx| {
        let (label, _) = ctx.use_state("B".to_owned())?;
        Ok(label.into())
    })
    .with_key("k");
    let tree: Element = BaseElement::new("Flex").child(first).child(second).into();

    let mut renderer = renderer();
    for _ in 0..2 {
        let node = renderer.render(&tree).unwrap();
        assert_eq!(child_node(&node, 0).children(), Some(&Value::from("A")));
        assert_eq!(child_node(&node, 1).children(), Some(&Value::from("B")));
        assert_eq!(table.refs(), 1);
    }
    assert!(!table.hit_zero.load(Ordering::SeqCst));
    assert_eq!(renderer.root_context().child_count(), 2);
}

#[test]
fn test_dropped_children_are_unmounted() {
    let show_panel = Arc::new(AtomicBool::new(true));
    let cleaned = Arc::new(AtomicBool::new(false));

    let c = cleaned.clone();
    let panel = FunctionElement::new("panel", move |ctx| {
        let c = c.clone();
        ctx.use_effect(
            move || {
                Ok(Some(Cleanup::new(move || {
                    c.store(true, Ordering::SeqCst);
                })))
            },
            (),
        )?;
        Ok("panel".into())
    });

    let show = show_panel.clone();
    let app = Element::function("app", move |_| {
        let mut root = BaseElement::new("Flex").child("header");
        if show.load(Ordering::SeqCst) {
            root = root.child(panel.clone());
        }
        Ok(root.into())
    });

    let mut renderer = renderer();
    renderer.render(&app).unwrap();
    assert!(!cleaned.load(Ordering::SeqCst));

    show_panel.store(false, Ordering::SeqCst);
    renderer.render(&app).unwrap();
    assert!(cleaned.load(Ordering::SeqCst));
}

#[test]
fn test_memoized_subtree_is_skipped_while_props_match() {
    let renders = Arc::new(AtomicUsize::new(0));
    let setter: Arc<Mutex<Option<StateSetter<i32>>>> = Arc::default();

    let tree = |label: &str| -> Element {
        let mut props = Props::new();
        props.insert("label".into(), label.into());
        let (r, s) = (renders.clone(), setter.clone());
        let row = MemoizedElement::component("row", props, move |ctx, props| {
            r.fetch_add(1, Ordering::SeqCst);
            let (clicks, set_clicks) = ctx.use_state(0)?;
            *s.lock() = Some(set_clicks);
            Ok(BaseElement::new("Text")
                .prop("label", props.get("label").cloned().unwrap_or_default())
                .child(clicks)
                .into())
        });
        BaseElement::new("Flex").child(row).into()
    };

    let mut renderer = renderer();
    let first = renderer.render(&tree("a")).unwrap();
    let second = renderer.render(&tree("a")).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 1);
    assert!(RenderedNode::ptr_eq(&child_node(&first, 0), &child_node(&second, 0)));

    renderer.render(&tree("b")).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    // Internal state changes bypass the props check
    setter.lock().as_ref().unwrap().set(1);
    let updated = renderer.render(&tree("b")).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 3);
    let text = child_node(&updated, 0)
        .children()
        .and_then(Value::as_node)
        .cloned()
        .unwrap();
    assert_eq!(text.children(), Some(&Value::from(vec![1])));
}

#[test]
fn test_setters_work_across_threads() {
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    let mut renderer = Renderer::with_session(Session::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let setter: Arc<Mutex<Option<StateSetter<i64>>>> = Arc::default();
    let s = setter.clone();
    let element = Element::function("remote", move |ctx| {
        let (value, set_value) = ctx.use_state(0i64)?;
        *s.lock() = Some(set_value);
        Ok(value.into())
    });
    renderer.render(&element).unwrap();

    let set_value = setter.lock().clone().unwrap();
    std::thread::spawn(move || {
        set_value.set(42);
    })
    .join()
    .unwrap();

    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(renderer.root_context().is_dirty());
    let node = renderer.render(&element).unwrap();
    assert_eq!(node.children(), Some(&Value::Int(42)));
}

#[test]
fn test_hooks_need_a_rendering_context() {
    let renderer = renderer();
    let err = renderer.root_context().use_state(0).unwrap_err();
    assert!(matches!(err, RenderError::NoActiveContext { .. }));
}
