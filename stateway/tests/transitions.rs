//! Transition pipeline behavior: phase ordering, hook return values,
//! dynamic transitions, ignore semantics, and cancellation.

mod common;

use common::{go, go_params, router, track_lifecycle, HookLog};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stateway::prelude::*;

fn register_chain(r: &stateway::Router) {
    let registry = r.state_registry();
    registry.register(StateDeclaration::named("A")).unwrap();
    registry.register(StateDeclaration::named("A.B")).unwrap();
    registry.register(StateDeclaration::named("A.B.C")).unwrap();
    registry.register(StateDeclaration::named("A.B.C.D")).unwrap();
    registry.register(StateDeclaration::named("B")).unwrap();
}

#[tokio::test]
async fn enter_order_is_shallowest_first() {
    let (r, _) = router();
    register_chain(&r);
    let log = HookLog::new();
    go(&r, "A").await.unwrap();
    track_lifecycle(&r, &log);

    go(&r, "A.B.C.D").await.unwrap();
    let entered: Vec<String> = log
        .snapshot()
        .into_iter()
        .filter(|e| e.starts_with("enter:"))
        .collect();
    assert_eq!(entered, vec!["enter:A.B", "enter:A.B.C", "enter:A.B.C.D"]);
}

#[tokio::test]
async fn exit_order_is_deepest_first() {
    let (r, _) = router();
    register_chain(&r);
    go(&r, "A.B.C.D").await.unwrap();
    let log = HookLog::new();
    track_lifecycle(&r, &log);

    go(&r, "A").await.unwrap();
    let exited: Vec<String> = log
        .snapshot()
        .into_iter()
        .filter(|e| e.starts_with("exit:"))
        .collect();
    assert_eq!(exited, vec!["exit:A.B.C.D", "exit:A.B.C", "exit:A.B"]);
}

#[tokio::test]
async fn exits_run_before_entries() {
    let (r, _) = router();
    register_chain(&r);
    go(&r, "A.B.C").await.unwrap();
    let log = HookLog::new();
    track_lifecycle(&r, &log);

    go(&r, "B").await.unwrap();
    let relevant: Vec<String> = log
        .snapshot()
        .into_iter()
        .filter(|e| !e.starts_with("retain:"))
        .collect();
    assert_eq!(
        relevant,
        vec!["exit:A.B.C", "exit:A.B", "exit:A", "enter:B"]
    );
}

#[tokio::test]
async fn state_declared_hooks_fire() {
    let (r, _) = router();
    let log = HookLog::new();
    let enter_log = log.clone();
    let exit_log = log.clone();
    r.state_registry()
        .register(StateDeclaration::named("home").on_enter(Arc::new(move |_t, state| {
            enter_log.push(format!("decl-enter:{}", state.name()));
            HookReturn::ok()
        })))
        .unwrap();
    r.state_registry()
        .register(
            StateDeclaration::named("home.sub").on_exit(Arc::new(move |_t, state| {
                exit_log.push(format!("decl-exit:{}", state.name()));
                HookReturn::ok()
            })),
        )
        .unwrap();

    go(&r, "home.sub").await.unwrap();
    go(&r, "home").await.unwrap();
    assert_eq!(
        log.snapshot(),
        vec!["decl-enter:home", "decl-exit:home.sub"]
    );
}

#[tokio::test]
async fn hook_returning_cancel_aborts() {
    let (r, _) = router();
    register_chain(&r);
    r.transition_service()
        .on_before(HookMatchCriteria::new().to("B"), |_t, _s| HookReturn::cancel());

    let err = go(&r, "B").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Aborted);
    // other targets unaffected
    assert!(go(&r, "A").await.is_ok());
}

#[tokio::test]
async fn hook_error_becomes_error_rejection() {
    let (r, _) = router();
    register_chain(&r);
    r.transition_service()
        .on_start(HookMatchCriteria::new().to("A"), |_t, _s| {
            HookReturn::error(json!({"reason": "nope"}))
        });

    let err = go(&r, "A").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Error);
    assert_eq!(err.detail.unwrap()["reason"], "nope");
}

#[tokio::test]
async fn async_hooks_are_awaited_in_order() {
    let (r, _) = router();
    register_chain(&r);
    let log = HookLog::new();
    let slow_log = log.clone();
    let fast_log = log.clone();
    let ts = r.transition_service();
    ts.on_phase_with(
        TransitionHookPhase::Start,
        HookMatchCriteria::new(),
        HookRegOptions::priority(10),
        move |_t, _s| {
            let log = slow_log.clone();
            HookReturn::wait(async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                log.push("slow");
            })
        },
    );
    ts.on_start(HookMatchCriteria::new(), move |_t, _s| {
        fast_log.push("fast");
        HookReturn::ok()
    });

    go(&r, "A").await.unwrap();
    // priority 10 runs first and is fully awaited before the next hook
    assert_eq!(log.snapshot(), vec!["slow", "fast"]);
}

#[tokio::test]
async fn repeat_navigation_is_ignored_without_hooks() {
    let (r, _) = router();
    register_chain(&r);
    go(&r, "A.B").await.unwrap();
    let log = HookLog::new();
    track_lifecycle(&r, &log);

    let first = go(&r, "A.B").await.unwrap_err();
    let second = go(&r, "A.B").await.unwrap_err();
    assert_eq!(first.kind, RejectionKind::Ignored);
    assert_eq!(second.kind, RejectionKind::Ignored);
    assert!(log.snapshot().is_empty(), "no enter/exit hooks may fire");
}

#[tokio::test]
async fn reload_reenters_current_state() {
    let (r, _) = router();
    register_chain(&r);
    go(&r, "A.B").await.unwrap();
    let log = HookLog::new();
    track_lifecycle(&r, &log);

    r.state_service()
        .go(
            "A.B",
            HashMap::new(),
            TransitionOptions::new().reload(ReloadOption::State("A.B".into())),
        )
        .await
        .unwrap();
    assert_eq!(log.snapshot(), vec![
        "exit:A.B",
        "retain:",
        "retain:A",
        "enter:A.B",
    ]);
}

#[tokio::test]
async fn dynamic_param_change_fires_no_enter_exit() {
    let (r, _) = router();
    r.state_registry()
        .register(
            StateDeclaration::named("tabs")
                .url("/tabs/:tab")
                .param("tab", ParamDeclaration::new().dynamic(true).default_value("one")),
        )
        .unwrap();
    go_params(&r, "tabs", HashMap::from([(String::from("tab"), json!("one"))]))
        .await
        .unwrap();

    let log = HookLog::new();
    track_lifecycle(&r, &log);
    go_params(&r, "tabs", HashMap::from([(String::from("tab"), json!("two"))]))
        .await
        .unwrap();

    let snapshot = log.snapshot();
    assert!(
        snapshot.iter().all(|e| e.starts_with("retain:")),
        "only retain hooks may fire, got {snapshot:?}"
    );
    assert!(snapshot.contains(&"retain:tabs".to_string()));
    assert_eq!(r.globals().params()["tab"], json!("two"));
}

#[tokio::test]
async fn abort_rejects_with_aborted() {
    let (r, _) = router();
    register_chain(&r);
    r.transition_service()
        .on_start(HookMatchCriteria::new(), |trans, _s| {
            HookReturn::wait(async move {
                trans.abort();
            })
        });

    let err = go(&r, "A").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Aborted);
}

#[tokio::test]
async fn invalid_target_rejects_and_reaches_default_handler() {
    let (r, _) = router();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    r.state_service().default_error_handler(move |rejection| {
        sink.lock().unwrap().push(rejection.kind);
    });

    let err = go(&r, "no.such.state").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Invalid);
    assert_eq!(seen.lock().unwrap().as_slice(), &[RejectionKind::Invalid]);
}

#[tokio::test]
async fn ignored_rejections_skip_default_handler() {
    let (r, _) = router();
    register_chain(&r);
    go(&r, "A").await.unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    r.state_service().default_error_handler(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let _ = go(&r, "A").await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_required_param_is_invalid() {
    let (r, _) = router();
    r.state_registry()
        .register(StateDeclaration::named("user").url("/users/:id"))
        .unwrap();

    let err = go(&r, "user").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Invalid);
    assert!(err.detail.unwrap().to_string().contains("id"));

    let ok = go_params(&r, "user", HashMap::from([(String::from("id"), json!("1"))])).await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn abstract_state_cannot_be_a_target() {
    let (r, _) = router();
    r.state_registry()
        .register(StateDeclaration::named("shell").abstract_state())
        .unwrap();
    r.state_registry()
        .register(StateDeclaration::named("shell.page"))
        .unwrap();

    let err = go(&r, "shell").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Invalid);
    assert!(err.detail.unwrap().to_string().contains("abstract"));

    // its concrete child is fine
    assert_eq!(go(&r, "shell.page").await.unwrap().name(), "shell.page");
}

#[tokio::test]
async fn invoke_limit_caps_hook_invocations() {
    let (r, _) = router();
    register_chain(&r);
    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    r.transition_service().on_phase_with(
        TransitionHookPhase::Start,
        HookMatchCriteria::new(),
        HookRegOptions::default().invoke_limit(1),
        move |_t, _s| {
            sink.fetch_add(1, Ordering::SeqCst);
            HookReturn::ok()
        },
    );

    go(&r, "A").await.unwrap();
    go(&r, "A.B").await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn on_create_errors_abort_creation() {
    let (r, _) = router();
    register_chain(&r);
    r.transition_service()
        .on_create(HookMatchCriteria::new().to("B"), |_trans| {
            Err(json!("creation vetoed"))
        });

    let err = go(&r, "B").await.unwrap_err();
    assert_eq!(err.kind, RejectionKind::Error);
    assert_eq!(err.detail.unwrap(), json!("creation vetoed"));
}

#[tokio::test]
async fn dispose_rejects_inflight_transition() {
    let (r, _) = router();
    register_chain(&r);
    let r2 = r.clone();
    r.transition_service()
        .on_start(HookMatchCriteria::new(), move |_t, _s| {
            let router = r2.clone();
            HookReturn::wait(async move {
                router.dispose();
            })
        });

    let err = go(&r, "A").await.unwrap_err();
    let detail = err.detail.unwrap().to_string();
    assert!(detail.contains("disposed"), "{detail}");

    // registration is inert afterwards
    assert!(matches!(
        r.state_registry().register(StateDeclaration::named("late")),
        Err(ConfigError::Disposed)
    ));
}
