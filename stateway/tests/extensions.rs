//! Extension points: registry listeners, builder decorators, custom
//! parameter types, plugins, and the view registry.

mod common;

use common::{go, go_params, router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stateway::prelude::*;
use stateway::state::StateRegistryEvent;
use stateway::view::ActiveViewConfig;

#[tokio::test]
async fn registry_listeners_observe_both_directions() {
    let (r, _) = router();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    r.state_registry().on_states_changed(Arc::new(move |event, decls| {
        let names: Vec<String> = decls.iter().map(|d| d.name.clone()).collect();
        sink.lock().unwrap().push((event, names));
    }));

    r.state_registry().register(StateDeclaration::named("a")).unwrap();
    r.state_registry().register(StateDeclaration::named("a.b")).unwrap();
    r.state_registry().deregister("a").unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events[0], (StateRegistryEvent::Registered, vec!["a".into()]));
    assert_eq!(events[1], (StateRegistryEvent::Registered, vec!["a.b".into()]));
    assert_eq!(
        events[2],
        (StateRegistryEvent::Deregistered, vec!["a.b".into(), "a".into()])
    );
}

#[tokio::test]
async fn decorator_rewrites_built_data() {
    let (r, _) = router();
    r.state_registry().decorator(
        "data",
        Arc::new(|building: &mut stateway::state::StateBuilding| {
            building
                .data
                .insert("decorated".into(), Value::Bool(true));
        }),
    );
    r.state_registry()
        .register(StateDeclaration::named("s").data("own", json!(1)))
        .unwrap();

    let state = r.state_registry().get_state("s").unwrap();
    assert_eq!(state.data()["own"], json!(1));
    assert_eq!(state.data()["decorated"], Value::Bool(true));
}

#[tokio::test]
async fn custom_param_type_participates_in_matching() {
    let (r, location) = router();

    struct Hex;
    impl ParamTypeDef for Hex {
        fn is(&self, value: &Value) -> bool {
            value.as_u64().is_some()
        }
        fn encode(&self, value: &Value) -> stateway::param::Encoded {
            stateway::param::Encoded::One(format!("{:x}", value.as_u64().unwrap_or(0)))
        }
        fn decode(&self, raw: &str) -> Value {
            u64::from_str_radix(raw, 16)
                .map(Value::from)
                .unwrap_or(Value::Null)
        }
    }

    r.matcher_factory()
        .register_type(ParamType::new("hex", "[0-9a-f]+", Arc::new(Hex)))
        .unwrap();
    r.state_registry()
        .register(StateDeclaration::named("block").url("/block/{height:hex}"))
        .unwrap();

    location.set_url("/block/ff", false);
    r.url_service().sync();
    common::wait_for(|| r.globals().current_state().name() == "block").await;
    assert_eq!(r.globals().params()["height"], json!(255));

    let href = r
        .state_service()
        .href("block", HashMap::from([(String::from("height"), json!(255))]))
        .unwrap();
    assert_eq!(href, "/block/ff");
}

#[tokio::test]
async fn duplicate_param_type_is_rejected() {
    let (r, _) = router();
    struct Noop;
    impl ParamTypeDef for Noop {
        fn is(&self, _v: &Value) -> bool {
            true
        }
        fn encode(&self, v: &Value) -> stateway::param::Encoded {
            stateway::param::Encoded::One(v.to_string())
        }
        fn decode(&self, raw: &str) -> Value {
            Value::String(raw.into())
        }
    }
    let err = r
        .matcher_factory()
        .register_type(ParamType::new("int", "x", Arc::new(Noop)))
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateParamType(_)));
}

#[tokio::test]
async fn plugin_installs_and_disposes() {
    struct Counter {
        installs: Arc<Mutex<Vec<&'static str>>>,
    }
    impl RouterPlugin for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn install(&self, _router: &stateway::Router) {
            self.installs.lock().unwrap().push("install");
        }
        fn dispose(&self, _router: &stateway::Router) {
            self.installs.lock().unwrap().push("dispose");
        }
    }

    let (r, _) = router();
    let calls = Arc::new(Mutex::new(Vec::new()));
    r.plugin(Arc::new(Counter {
        installs: calls.clone(),
    }));
    assert!(r.get_plugin("counter").is_some());
    assert!(r.get_plugin("ghost").is_none());

    assert!(r.dispose_plugin("counter"));
    assert!(r.get_plugin("counter").is_none());
    assert_eq!(calls.lock().unwrap().as_slice(), &["install", "dispose"]);
}

#[tokio::test]
async fn views_activate_on_successful_transitions() {
    let (r, _) = router();
    r.state_registry()
        .register(
            StateDeclaration::named("home")
                .view("content", json!({"component": "HomePage"})),
        )
        .unwrap();
    r.state_registry()
        .register(StateDeclaration::named("away"))
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::<Option<ActiveViewConfig>>::new()));
    let sink = seen.clone();
    r.view_service().register_ui_view(
        "content@home",
        Arc::new(move |config| sink.lock().unwrap().push(config)),
    );

    go(&r, "home").await.unwrap();
    go(&r, "away").await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].is_none(), "empty before any navigation");
    let active = seen[1].as_ref().unwrap();
    assert_eq!(active.state, "home");
    assert_eq!(active.config["component"], "HomePage");
    assert!(seen[2].is_none(), "cleared after leaving the state");
}

#[tokio::test]
async fn config_params_pass_values_without_urls() {
    let (r, _) = router();
    r.state_registry()
        .register(
            StateDeclaration::named("wizard")
                .param("step", ParamDeclaration::new().typed("int").default_value(1)),
        )
        .unwrap();

    go_params(&r, "wizard", HashMap::from([(String::from("step"), json!(3))]))
        .await
        .unwrap();
    assert_eq!(r.globals().params()["step"], json!(3));

    // same state, different non-dynamic param: re-enters
    let log = common::HookLog::new();
    common::track_lifecycle(&r, &log);
    go_params(&r, "wizard", HashMap::from([(String::from("step"), json!(4))]))
        .await
        .unwrap();
    assert!(log.snapshot().contains(&"enter:wizard".to_string()));
}
