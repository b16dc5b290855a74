//! Integration Tests for Reactive Trees
//!
//! These tests drive trees the way an application would: build a store, read
//! and write through it, subscribe with effects and dispatch actions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deepstate_core::{
    batch, reify, shallow, ActionMap, Effect, Field, Json, Mode, Node, Options, ReifyError,
    Result, Signal, Value,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int(node: &Node, key: &str) -> Result<i64> {
    Ok(node.json(key)?.as_i64().unwrap_or(0))
}

/// A `count` / `double` store whose computed counts its own invocations.
fn counter(mode: Mode) -> (deepstate_core::Store, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let store = reify(
        Value::object([
            ("count", Value::from(0)),
            ("other", Value::from("unrelated")),
            (
                "double",
                Value::computed(move |this| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(int(this, "count")? * 2))
                }),
            ),
        ]),
        Options::default().with_mode(mode),
    )
    .unwrap();
    (store, calls)
}

/// Test the basic count/double example.
#[test]
fn double_follows_count() {
    init_tracing();
    let (store, _) = counter(Mode::Spa);

    assert_eq!(store.state.json("double").unwrap(), json!(0));
    store.state.set("count", 5).unwrap();
    assert_eq!(store.state.json("double").unwrap(), json!(10));
}

/// Test that every primitive leaf reads back what was written.
#[test]
fn leaf_write_read_round_trip() {
    let store = reify(
        json!({"n": 1, "s": "a", "b": false, "z": null, "deep": {"list": [1, 2]}}),
        Options::default(),
    )
    .unwrap();
    let state = &store.state;

    for (key, next) in [
        ("n", json!(2.5)),
        ("s", json!("b")),
        ("b", json!(true)),
        ("z", json!("no longer null")),
    ] {
        state.set(key, next.clone()).unwrap();
        assert_eq!(state.json(key).unwrap(), next);
    }

    let list = state.child("deep").unwrap().child("list").unwrap();
    list.set("1", 20).unwrap();
    assert_eq!(list.json("1").unwrap(), json!(20));
}

/// Test the memoization law: one recompute per dependency-changing write.
#[test]
fn spa_computeds_are_memoized() {
    let (store, calls) = counter(Mode::Spa);
    let state = &store.state;

    state.json("double").unwrap();
    state.json("double").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    state.set("other", "still unrelated").unwrap();
    state.json("double").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    state.set("count", 1).unwrap();
    state.set("count", 2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.json("double").unwrap(), json!(4));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Writing the same value again changes nothing.
    state.set("count", 2).unwrap();
    state.json("double").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test that SSR trees run the computed exactly once per read.
#[test]
fn ssr_computeds_run_on_every_read() {
    let (store, calls) = counter(Mode::Ssr);
    let state = &store.state;

    for expected in 1..=3 {
        assert_eq!(state.json("double").unwrap(), json!(0));
        assert_eq!(calls.load(Ordering::SeqCst), expected);
    }
    state.set("count", 4).unwrap();
    assert_eq!(state.json("double").unwrap(), json!(8));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// Test that computeds can read the root from anywhere in the tree.
#[test]
fn computeds_reach_the_root() {
    let store = reify(
        Value::object([
            ("rate", Value::from(3)),
            (
                "cart",
                Value::object([
                    ("qty", Value::from(2)),
                    (
                        "total",
                        Value::computed_with_root(|this, root| {
                            Ok(json!(int(this, "qty")? * int(root, "rate")?))
                        }),
                    ),
                ]),
            ),
        ]),
        Options::default(),
    )
    .unwrap();

    let cart = store.state.child("cart").unwrap();
    assert_eq!(cart.json("total").unwrap(), json!(6));
    store.state.set("rate", 10).unwrap();
    assert_eq!(cart.json("total").unwrap(), json!(20));
}

/// Test that a root-taking computed fails once the root is gone, while a
/// local one keeps working.
#[test]
fn missing_root_is_an_error() {
    let store = reify(
        Value::object([(
            "inner",
            Value::object([
                ("x", Value::from(1)),
                ("local", Value::computed(|this| Ok(json!(int(this, "x")? + 1)))),
                (
                    "rooted",
                    Value::computed_with_root(|_, root| Ok(json!(root.keys().len()))),
                ),
            ]),
        )]),
        Options::default(),
    )
    .unwrap();

    let inner = store.state.child("inner").unwrap();
    drop(store);

    assert_eq!(inner.json("local").unwrap(), json!(2));
    assert_eq!(
        inner.json("rooted"),
        Err(ReifyError::RootUnavailable {
            key: "rooted".into()
        })
    );
}

/// Test that serialization never includes computeds.
#[test]
fn json_omits_computeds() {
    let (store, calls) = counter(Mode::Spa);
    let text = store.to_json_string().unwrap();

    assert_eq!(text, r#"{"count":0,"other":"unrelated"}"#);
    assert!(!text.contains("double"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Test strict versus permissive handling of undeclared keys.
#[test]
fn strict_rejects_what_permissive_accepts() {
    let strict = reify(json!({"a": {"b": 1}}), Options::default()).unwrap();
    let nested = strict.state.child("a").unwrap();
    assert!(matches!(
        nested.set("c", 2),
        Err(ReifyError::UnknownProperty { .. })
    ));

    let loose = reify(json!({"a": {"b": 1}}), Options::default().with_permissive(true)).unwrap();
    let nested = loose.state.child("a").unwrap();
    nested.set("c", 2).unwrap();
    assert_eq!(nested.json("c").unwrap(), json!(2));
    assert_eq!(loose.to_json(), json!({"a": {"b": 1, "c": 2}}));
}

/// Test that only shallow arrays may be replaced wholesale.
#[test]
fn shallow_arrays_can_be_replaced() {
    let store = reify(
        Value::object([
            ("deep", Value::from(json!([1, 2]))),
            ("flat", Value::from(shallow(json!([1, 2])))),
        ]),
        Options::default(),
    )
    .unwrap();

    assert_eq!(
        store.state.set("deep", json!([3])),
        Err(ReifyError::ReplacementDisallowed {
            key: "deep".into(),
            found: "deep array"
        })
    );
    store.state.set("flat", json!([3])).unwrap();
    assert_eq!(store.to_json(), json!({"deep": [1, 2], "flat": [3]}));
}

/// Test that outside mutation of a shallow value shows through the store.
#[test]
fn shallow_values_read_through() {
    let original = shallow(json!({"x": 1}));
    let store = reify(
        Value::object([("a", Value::from(original.clone()))]),
        Options::default().with_mode(Mode::Ssr),
    )
    .unwrap();

    original.set("x", 2);
    let Some(Field::Shallow(a)) = store.state.get("a").unwrap() else {
        panic!("expected a shallow value");
    };
    assert_eq!(a.json("x"), json!(2));
}

/// Test that shallow contents are not reactive but reassigning them is.
#[test]
fn shallow_reassignment_notifies() {
    let store = reify(
        Value::object([("cfg", Value::from(shallow(json!({"theme": "dark"}))))]),
        Options::default(),
    )
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (state, log) = (store.state.clone(), seen.clone());
    let _effect = Effect::new(move || {
        if let Ok(Some(Field::Shallow(cfg))) = state.get("cfg") {
            log.lock().push(cfg.json("theme"));
        }
    });

    let Some(Field::Shallow(cfg)) = store.state.get("cfg").unwrap() else {
        panic!("expected a shallow value");
    };
    cfg.set("theme", "light");
    store
        .state
        .set("cfg", shallow(json!({"theme": "blue"})))
        .unwrap();

    assert_eq!(*seen.lock(), vec![json!("dark"), json!("blue")]);
}

/// Test that batched pushes produce one notification.
#[test]
fn batched_pushes_notify_once() {
    let store = reify(json!({"todos": []}), Options::default()).unwrap();
    let todos = store.state.child("todos").unwrap();
    let lengths = Arc::new(Mutex::new(Vec::new()));

    let (probe, log) = (todos.clone(), lengths.clone());
    let _effect = Effect::new(move || log.lock().push(probe.json("length").unwrap()));

    batch(|| -> Result<()> {
        todos.push(json!({"title": "t1"}))?;
        todos.push(json!({"title": "t2"}))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(*lengths.lock(), vec![json!(0), json!(2)]);
}

/// Test that without a batch each write notifies on its own.
#[test]
fn unbatched_writes_notify_each_time() {
    let store = reify(json!({"a": 1, "b": 2}), Options::default()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let (state, counter) = (store.state.clone(), runs.clone());
    let _effect = Effect::new(move || {
        state.json("a").unwrap();
        state.json("b").unwrap();
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.state.set("a", 10).unwrap();
    store.state.set("b", 20).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    batch(|| {
        store.state.set("a", 11).unwrap();
        store.state.set("b", 21).unwrap();
    });
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

/// Test that effects see consistent computed values.
#[test]
fn effects_observe_computeds() {
    let (store, calls) = counter(Mode::Spa);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (state, log) = (store.state.clone(), seen.clone());
    let _effect = Effect::new(move || {
        log.lock()
            .push((state.json("count").unwrap(), state.json("double").unwrap()));
    });

    store.state.set("count", 3).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![(json!(0), json!(0)), (json!(3), json!(6))]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test that the escape hatch exposes live cells.
#[test]
fn escape_hatch_exposes_signals() {
    let (store, _) = counter(Mode::Spa);
    let Some(Field::Signal(count)) = store.state.get("$count").unwrap() else {
        panic!("expected a signal");
    };

    count.set(json!(21));
    assert_eq!(store.state.json("double").unwrap(), json!(42));
    assert!(matches!(
        store.state.set("$count", 1),
        Err(ReifyError::EscapeHatchAssignment { .. })
    ));
}

/// Test that externally created signals stay shared with the caller.
#[test]
fn external_signals_are_shared() {
    let shared = Signal::new(json!("hello"));
    let store = reify(
        Value::object([("greeting", Value::from(shared.clone()))]),
        Options::default(),
    )
    .unwrap();

    shared.set(json!("bye"));
    assert_eq!(store.state.json("greeting").unwrap(), json!("bye"));
    store.state.set("greeting", "again").unwrap();
    assert_eq!(shared.peek(), json!("again"));
}

/// Test that options load from their JSON form.
#[test]
fn options_from_json() {
    let options = Options::from_json(r#"{"permissive": true, "mode": "ssr", "escapeHatch": "@"}"#)
        .unwrap();
    let store = reify(json!({"a": 1}), options).unwrap();

    assert!(store.options().permissive);
    assert_eq!(store.options().mode, Mode::Ssr);
    assert!(store.state.get("@a").unwrap().unwrap().as_signal().is_some());
}

/// Test actions bound to the store.
#[test]
fn actions_close_over_state() {
    let store = reify(json!({"todos": []}), Options::default())
        .unwrap()
        .attach(ActionMap::new().action("add", |state, args| {
            let todos = state
                .child("todos")
                .ok_or_else(|| ReifyError::msg("todos missing"))?;
            let title = args.first().cloned().unwrap_or(Json::Null);
            let len = todos.push(json!({"title": title, "done": false}))?;
            Ok(json!(len))
        }));

    assert_eq!(store.actions.call("add", &[json!("write")]).unwrap(), json!(1));
    assert_eq!(
        store.to_json(),
        json!({"todos": [{"title": "write", "done": false}]})
    );
    assert_eq!(
        store.actions.call("remove", &[]).unwrap_err().to_string(),
        "actions.remove is not a function"
    );
}

/// Test that async actions can suspend while others use the tree.
#[tokio::test]
async fn async_actions_interleave_with_writes() {
    init_tracing();
    let store = reify(json!({"status": "idle", "items": []}), Options::default())
        .unwrap()
        .attach(ActionMap::new().async_action("load", |state, args| async move {
            state.set("status", "loading")?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            let items = state
                .child("items")
                .ok_or_else(|| ReifyError::msg("items missing"))?;
            for item in args {
                items.push(item)?;
            }
            state.set("status", "ready")?;
            Ok::<_, ReifyError>(json!(items.len()))
        }));

    let actions = store.actions.clone();
    let task = tokio::spawn(async move { actions.call_async("load", vec![json!(1), json!(2)]).await });

    tokio::time::sleep(Duration::from_millis(1)).await;
    store.state.child("items").unwrap().push(0).unwrap();

    assert_eq!(task.await.unwrap().unwrap(), json!(3));
    assert_eq!(store.state.json("status").unwrap(), json!("ready"));
    assert_eq!(store.to_json()["items"], json!([0, 1, 2]));
}

/// Test that sync actions are also reachable through call_async.
#[tokio::test]
async fn call_async_dispatches_sync_actions() {
    let store = reify(json!({"n": 1}), Options::default())
        .unwrap()
        .attach(ActionMap::new().action("bump", |state, _| {
            let next = int(state, "n")? + 1;
            state.set("n", next)?;
            Ok(json!(next))
        }));

    assert_eq!(store.actions.call_async("bump", vec![]).await.unwrap(), json!(2));
    assert!(matches!(
        store.actions.call_async("nope", vec![]).await,
        Err(ReifyError::UnknownAction { .. })
    ));
}
