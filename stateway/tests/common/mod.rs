//! Shared helpers for the integration tests.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stateway::location::MemoryLocation;
use stateway::prelude::*;
use stateway::Router;

pub fn router() -> (Router, Arc<MemoryLocation>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Router::with_memory_location()
}

pub async fn go(router: &Router, name: &str) -> Result<StateRef, Rejection> {
    router
        .state_service()
        .go(name, HashMap::new(), TransitionOptions::new())
        .await
}

pub async fn go_params(
    router: &Router,
    name: &str,
    params: HashMap<String, Value>,
) -> Result<StateRef, Rejection> {
    router
        .state_service()
        .go(name, params, TransitionOptions::new())
        .await
}

/// Spin the (current-thread) runtime until `condition` holds. Panics
/// after a generous number of polls so a broken pipeline fails loudly
/// instead of hanging.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for i in 0..2_000 {
        if condition() {
            return;
        }
        if i % 50 == 49 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Ordered record of hook firings.
#[derive(Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl HookLog {
    pub fn new() -> HookLog {
        HookLog::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Record every enter/exit/retain hook firing as `"enter:name"` etc.
pub fn track_lifecycle(router: &Router, log: &HookLog) {
    let ts = router.transition_service();
    let enter_log = log.clone();
    ts.on_enter(HookMatchCriteria::new(), move |_t, state| {
        enter_log.push(format!("enter:{}", state.unwrap().name()));
        HookReturn::ok()
    });
    let exit_log = log.clone();
    ts.on_exit(HookMatchCriteria::new(), move |_t, state| {
        exit_log.push(format!("exit:{}", state.unwrap().name()));
        HookReturn::ok()
    });
    let retain_log = log.clone();
    ts.on_retain(HookMatchCriteria::new(), move |_t, state| {
        retain_log.push(format!("retain:{}", state.unwrap().name()));
        HookReturn::ok()
    });
}
