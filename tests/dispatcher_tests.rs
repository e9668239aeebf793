//! Tests for publish/subscribe and request/response between a hub and a spoke
//!
//! # Test Coverage
//!
//! - Listener dispatch: literal and parameterized patterns, ordering, removal,
//!   `once`, panics, registration during dispatch
//! - Handler dispatch: `invoke` round trip, duplicate registration,
//!   `handle_once`, missing handler, handler errors and panics
//! - Correlation: deadlines, late responses, concurrent invokes
//!
//! # Test Strategy
//!
//! Every test drives a real hub/spoke pair over `LocalBus`. Listeners run on
//! the receiving side's dispatch coroutine, so assertions about them poll a
//! recorder with a deadline instead of checking right after `send`.

mod common;

use brrtbus::{listener, Endpoint, IpcError};
use common::fixtures::{pair, recorder, recording, wait_for, wait_until, TEST_TIMEOUT};
use common::test_runtime::setup_may_runtime;
use common::tracing_util::TestTracing;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn setup() -> TestTracing {
    setup_may_runtime();
    TestTracing::init()
}

#[test]
fn test_literal_listener_receives_args_unchanged() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.on("settings/theme", recording(&rec, "theme")).unwrap();

    spoke
        .send("settings/theme", [json!("dark"), json!({ "contrast": 2 })])
        .unwrap();

    assert!(wait_for(&rec, 1));
    let seen = rec.lock()[0].clone();
    assert_eq!(seen.args, vec![json!("dark"), json!({ "contrast": 2 })]);
    assert!(seen.headers.params.is_empty());
    assert!(!seen.headers.is_handler_bound());
}

#[test]
fn test_params_extracted_per_pattern() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.on("a/:id1/:id2", recording(&rec, "both")).unwrap();
    hub.on("b/:id1/:id2?", recording(&rec, "optional")).unwrap();

    spoke.send("a/x/7", []).unwrap();
    spoke.send("b/x", []).unwrap();

    assert!(wait_for(&rec, 2));
    let seen = rec.lock().clone();
    assert_eq!(seen[0].tag, "both");
    assert_eq!(seen[0].headers.param("id1"), Some("x"));
    assert_eq!(seen[0].headers.param("id2"), Some("7"));
    assert_eq!(seen[1].tag, "optional");
    assert_eq!(seen[1].headers.param("id1"), Some("x"));
    assert!(!seen[1].headers.params.contains_key("id2"));
}

#[test]
fn test_every_matching_pattern_fires() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.on("user/:id", recording(&rec, "by-id")).unwrap();
    hub.on("user/42", recording(&rec, "literal")).unwrap();
    hub.on("team/:id", recording(&rec, "other")).unwrap();

    spoke.send("user/42", []).unwrap();

    assert!(wait_for(&rec, 2));
    std::thread::sleep(Duration::from_millis(50));
    let tags: Vec<_> = rec.lock().iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec!["by-id", "literal"]);
}

#[test]
fn test_listeners_fire_in_order_and_removal_by_identity() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    let first = recording(&rec, "first");
    let second = recording(&rec, "second");
    hub.on("p", Arc::clone(&first))
        .unwrap()
        .on("p", Arc::clone(&second))
        .unwrap();
    assert_eq!(hub.listener_count("p"), 2);

    spoke.send("p", []).unwrap();
    assert!(wait_for(&rec, 2));
    let tags: Vec<_> = rec.lock().iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec!["first", "second"]);

    hub.off("p", &first);
    rec.lock().clear();
    spoke.send("p", []).unwrap();
    assert!(wait_for(&rec, 1));
    std::thread::sleep(Duration::from_millis(50));
    let tags: Vec<_> = rec.lock().iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec!["second"]);

    hub.remove_listener("p", &second);
    assert!(hub.event_names().is_empty());
}

#[test]
fn test_headers_shared_between_listeners_of_one_pattern() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.on(
        "p/:id",
        listener(|headers, _| {
            headers
                .params
                .insert("id".to_string(), "rewritten".to_string());
        }),
    )
    .unwrap();
    hub.on("p/:id", recording(&rec, "after")).unwrap();

    spoke.send("p/1", []).unwrap();
    assert!(wait_for(&rec, 1));
    assert_eq!(rec.lock()[0].headers.param("id"), Some("rewritten"));
}

#[test]
fn test_once_listener_fires_once() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.once("ping", recording(&rec, "once")).unwrap();
    hub.on("ping", recording(&rec, "always")).unwrap();

    spoke.send("ping", []).unwrap();
    spoke.send("ping", []).unwrap();

    assert!(wait_for(&rec, 3));
    std::thread::sleep(Duration::from_millis(50));
    let tags: Vec<_> = rec.lock().iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec!["once", "always", "always"]);
    assert_eq!(hub.listener_count("ping"), 1);
}

#[test]
fn test_listener_panic_does_not_stop_others() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.on("p", listener(|_, _| panic!("listener exploded")))
        .unwrap();
    hub.on("p", recording(&rec, "survivor")).unwrap();

    spoke.send("p", [json!(1)]).unwrap();
    spoke.send("p", [json!(2)]).unwrap();

    assert!(wait_for(&rec, 2));
    let args: Vec<_> = rec.lock().iter().map(|s| s.args[0].clone()).collect();
    assert_eq!(args, vec![json!(1), json!(2)]);
}

#[test]
fn test_registration_during_dispatch_waits_for_next_envelope() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    let late = recording(&rec, "late");
    let registrar = hub.clone();
    let registered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&registered);
    hub.on(
        "p",
        listener(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                registrar.on("p", Arc::clone(&late)).unwrap();
            }
        }),
    )
    .unwrap();

    spoke.send("p", []).unwrap();
    assert!(wait_until(TEST_TIMEOUT, || registered.load(Ordering::SeqCst) == 1));
    std::thread::sleep(Duration::from_millis(50));
    assert!(rec.lock().is_empty());

    spoke.send("p", []).unwrap();
    assert!(wait_for(&rec, 1));
}

#[test]
fn test_extra_headers_travel_with_publish() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let rec = recorder();
    hub.on("p", recording(&rec, "p")).unwrap();

    let mut extra = Map::new();
    extra.insert("origin".to_string(), json!("settings-window"));
    spoke.send_with_headers("p", extra, []).unwrap();

    assert!(wait_for(&rec, 1));
    assert_eq!(
        rec.lock()[0].headers.extra.get("origin"),
        Some(&json!("settings-window"))
    );
}

#[test]
fn test_invoke_round_trip() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("greet", |_, args| {
        let word = args.first().and_then(Value::as_str).unwrap_or_default();
        Ok(json!(format!("{word} world")))
    })
    .unwrap();

    assert_eq!(spoke.invoke("greet", [json!("hello")]).unwrap(), json!("hello world"));
    assert_eq!(spoke.pending_requests(), 0);
}

#[test]
fn test_handler_sees_params() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("user/:id/:tab?", |headers, _| {
        Ok(json!({
            "id": headers.param("id"),
            "tab": headers.param("tab"),
        }))
    })
    .unwrap();

    assert_eq!(
        spoke.invoke("user/7", []).unwrap(),
        json!({ "id": "7", "tab": null })
    );
    assert_eq!(
        spoke.invoke("user/7/posts", []).unwrap(),
        json!({ "id": "7", "tab": "posts" })
    );
}

#[test]
fn test_duplicate_handler_rejected_original_kept() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("p", |_, _| Ok(json!("original"))).unwrap();

    let err = hub.handle("p", |_, _| Ok(json!("impostor"))).unwrap_err();
    assert_eq!(
        err,
        IpcError::DuplicateHandler {
            pattern: "p".to_string()
        }
    );
    assert_eq!(hub.handler_names(), vec!["p".to_string()]);
    assert_eq!(spoke.invoke("p", []).unwrap(), json!("original"));
}

#[test]
fn test_invoke_without_handler_names_path() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("other", |_, _| Ok(Value::Null)).unwrap();

    let err = spoke.invoke("missing/path", []).unwrap_err();
    assert_eq!(
        err,
        IpcError::NoHandlerFound {
            path: "missing/path".to_string()
        }
    );
    assert!(err.to_string().contains("missing/path"));
}

#[test]
fn test_handle_once_answers_once() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle_once("p", |_, args| Ok(args[0].clone())).unwrap();

    assert_eq!(spoke.invoke("p", [json!(1)]).unwrap(), json!(1));
    assert!(matches!(
        spoke.invoke("p", [json!(2)]),
        Err(IpcError::NoHandlerFound { .. })
    ));
    assert!(hub.handler_names().is_empty());
}

#[test]
fn test_handle_once_under_racing_requests() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    hub.handle_once("p", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!("won"))
    })
    .unwrap();

    let results: Vec<_> = (0..4)
        .map(|_| {
            let spoke = spoke.clone();
            std::thread::spawn(move || spoke.invoke("p", []))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(IpcError::NoHandlerFound { .. })))
            .count(),
        3
    );
}

#[test]
fn test_handler_error_reported_to_caller() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("fail", |_, _| Err(anyhow::anyhow!("disk full")))
        .unwrap();
    hub.handle("ok", |_, _| Ok(json!(true))).unwrap();

    assert_eq!(
        spoke.invoke("fail", []).unwrap_err(),
        IpcError::HandlerFailure {
            message: "disk full".to_string()
        }
    );
    // The failure does not affect later requests.
    assert_eq!(spoke.invoke("ok", []).unwrap(), json!(true));
}

#[test]
fn test_handler_panic_reported_as_failure() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("boom", |_, _| panic!("handler exploded")).unwrap();

    assert_eq!(
        spoke.invoke("boom", []).unwrap_err(),
        IpcError::HandlerFailure {
            message: "handler exploded".to_string()
        }
    );
    assert_eq!(spoke.invoke("boom", []).unwrap_err().to_string(), "Handler failed: handler exploded");
}

#[test]
fn test_invoke_times_out_after_deadline_not_before() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("slow", |_, _| {
        may::coroutine::sleep(Duration::from_millis(400));
        Ok(json!("too late"))
    })
    .unwrap();

    let timeout = Duration::from_millis(100);
    let start = Instant::now();
    let err = spoke.invoke_with_timeout("slow", [], timeout).unwrap_err();
    assert!(start.elapsed() >= timeout);
    assert!(matches!(
        err,
        IpcError::ResponseTimeout { timeout: t, .. } if t == timeout
    ));
    assert_eq!(spoke.pending_requests(), 0);

    // The late response is dropped and the next request still works.
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(
        spoke.invoke("slow", []).unwrap(),
        json!("too late")
    );
}

#[test]
fn test_slow_handler_does_not_block_dispatch() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("slow", |_, _| {
        may::coroutine::sleep(Duration::from_millis(300));
        Ok(json!("slow"))
    })
    .unwrap();
    hub.handle("fast", |_, _| Ok(json!("fast"))).unwrap();

    let slow_spoke = spoke.clone();
    let slow = std::thread::spawn(move || slow_spoke.invoke("slow", []));
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    assert_eq!(spoke.invoke("fast", []).unwrap(), json!("fast"));
    assert!(start.elapsed() < Duration::from_millis(300));
    assert_eq!(slow.join().unwrap().unwrap(), json!("slow"));
}

#[test]
fn test_concurrent_invokes_resolve_independently() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("square/:n", |headers, _| {
        let n: u64 = headers.param("n").unwrap_or("0").parse()?;
        may::coroutine::sleep(Duration::from_millis(50 - n * 5));
        Ok(json!(n * n))
    })
    .unwrap();

    let handles: Vec<_> = (0..8u64)
        .map(|n| {
            let spoke = spoke.clone();
            std::thread::spawn(move || (n, spoke.invoke(&format!("square/{n}"), [])))
        })
        .collect();
    for handle in handles {
        let (n, result) = handle.join().unwrap();
        assert_eq!(result.unwrap(), json!(n * n));
    }
    assert_eq!(spoke.pending_requests(), 0);
}

#[test]
fn test_handler_can_invoke_back() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    spoke.handle("whoami", |_, _| Ok(json!("spoke"))).unwrap();
    let caller = hub.clone();
    hub.handle("relay", move |_, _| {
        let name = caller.invoke("whoami", [])?;
        Ok(json!({ "relayed": name }))
    })
    .unwrap();

    assert_eq!(
        spoke.invoke("relay", []).unwrap(),
        json!({ "relayed": "spoke" })
    );
}

#[test]
fn test_listener_can_invoke_and_wait() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.handle("echo", |_, args| Ok(args.first().cloned().unwrap_or(Value::Null)))
        .unwrap();

    let outcome = Arc::new(parking_lot::Mutex::new(None));
    let rec = recorder();
    let caller = spoke.clone();
    let slot = Arc::clone(&outcome);
    spoke
        .on(
            "trigger",
            listener(move |_, _| {
                let started = Instant::now();
                let result =
                    caller.invoke_with_timeout("echo", [json!("hi")], Duration::from_millis(800));
                *slot.lock() = Some((result, started.elapsed()));
            }),
        )
        .unwrap()
        .on("after", recording(&rec, "after"))
        .unwrap();

    hub.send("trigger", []).unwrap();
    hub.send("after", []).unwrap();

    // The response settles while the listener is still blocked in invoke.
    assert!(wait_until(TEST_TIMEOUT, || outcome.lock().is_some()));
    let (result, elapsed) = outcome.lock().take().unwrap();
    assert_eq!(result.unwrap(), json!("hi"));
    assert!(elapsed < Duration::from_millis(800));
    // Publishes queued behind the blocked listener still fire afterwards.
    assert!(wait_for(&rec, 1));
}

#[test]
fn test_invalid_pattern_rejected() {
    let _tracing = setup();
    let (_bus, hub, _spoke) = pair();
    assert!(matches!(
        hub.on("a/:", listener(|_, _| {})),
        Err(IpcError::InvalidPattern { .. })
    ));
    assert!(matches!(
        hub.handle("a/:bad-name", |_, _| Ok(Value::Null)),
        Err(IpcError::InvalidPattern { .. })
    ));
    assert!(hub.event_names().is_empty());
    assert!(hub.handler_names().is_empty());
}

#[test]
fn test_remove_all_on_root_clears_everything() {
    let _tracing = setup();
    let (_bus, hub, spoke) = pair();
    hub.on("a", listener(|_, _| {}))
        .unwrap()
        .on("b/:id", listener(|_, _| {}))
        .unwrap()
        .handle("c", |_, _| Ok(Value::Null))
        .unwrap();
    assert_eq!(hub.event_names(), vec!["a".to_string(), "b/:id".to_string()]);

    hub.remove_all();
    assert!(hub.event_names().is_empty());
    assert!(hub.handler_names().is_empty());
    assert!(matches!(
        spoke.invoke("c", []),
        Err(IpcError::NoHandlerFound { .. })
    ));
}
