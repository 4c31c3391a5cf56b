//! Programmatic navigation: `go` / `transition_to`, target construction,
//! `href`, lazy loading, and the default error handler.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

use crate::router::{Router, WeakRouter};
use crate::transition::{Rejection, Transition, TransitionOptions};

use super::declaration::LazyLoadResult;
use super::object::{SharedLazyLoad, StateRef};
use super::target::TargetState;

/// Sink for rejections nobody handles: `Error`/`Invalid` transition
/// failures and late `NoWait` resolve failures.
pub type DefaultErrorHandler = Arc<dyn Fn(&Rejection) + Send + Sync>;

struct SsInner {
    router: RwLock<Option<WeakRouter>>,
    default_error_handler: RwLock<DefaultErrorHandler>,
}

/// The navigation façade over the registry, transition service, and
/// globals.
#[derive(Clone)]
pub struct StateService {
    inner: Arc<SsInner>,
}

impl StateService {
    pub(crate) fn new() -> StateService {
        StateService {
            inner: Arc::new(SsInner {
                router: RwLock::new(None),
                default_error_handler: RwLock::new(Arc::new(|rejection: &Rejection| {
                    error!(rejection = %rejection, "unhandled transition rejection");
                })),
            }),
        }
    }

    pub(crate) fn attach(&self, router: WeakRouter) {
        *self.inner.router.write().expect("router slot lock") = Some(router);
    }

    fn router(&self) -> Option<Router> {
        self.inner
            .router
            .read()
            .expect("router slot lock")
            .clone()?
            .upgrade()
            .map(Router::from_inner)
    }

    // ── Current view ────────────────────────────────────────────────────────

    /// The active state.
    pub fn current(&self) -> Option<StateRef> {
        self.router().map(|r| r.globals().current_state())
    }

    /// The active parameter values.
    pub fn params(&self) -> HashMap<String, Value> {
        self.router()
            .map(|r| r.globals().params())
            .unwrap_or_default()
    }

    // ── Target construction ─────────────────────────────────────────────────

    /// Resolve a (possibly relative) state reference into a target. The
    /// target is invalid (not an error) when the reference does not
    /// resolve; navigating to an invalid target rejects with `Invalid`.
    pub fn target(
        &self,
        name: &str,
        params: HashMap<String, Value>,
        options: TransitionOptions,
    ) -> TargetState {
        let target = TargetState::new(name, params, options);
        self.resolve_target(target)
    }

    fn resolve_target(&self, target: TargetState) -> TargetState {
        if target.state().is_some() || target.error_message().is_some() {
            return target;
        }
        let Some(router) = self.router() else {
            return target.unresolvable("router has been dropped");
        };
        let registry = router.state_registry();
        let base = match &target.options().relative {
            Some(name) => registry.get_state(name),
            None => Some(router.globals().current_state()),
        };
        match registry.matcher().find(target.name(), base.as_ref()) {
            // future placeholders pass: the lazy-load hook redirects off
            // them before they could become the active leaf
            Ok(Some(state)) if state.is_abstract() && !state.is_future() => {
                let message = format!("Cannot transition to abstract state '{}'", state.name());
                target.resolved(state).unresolvable(message)
            }
            Ok(Some(state)) => target.resolved(state),
            Ok(None) => {
                let message = format!("No such state '{}'", target.name());
                target.unresolvable(message)
            }
            Err(e) => target.unresolvable(e.to_string()),
        }
    }

    // ── Navigation ──────────────────────────────────────────────────────────

    /// Navigate to a state by name. Parameter values not supplied are
    /// inherited from the current ones where the parameter allows it.
    pub fn go(
        &self,
        name: &str,
        params: HashMap<String, Value>,
        options: TransitionOptions,
    ) -> BoxFuture<'static, Result<StateRef, Rejection>> {
        self.transition_to(self.target(name, params, options))
    }

    /// Navigate to an already-built target.
    pub fn transition_to(
        &self,
        target: TargetState,
    ) -> BoxFuture<'static, Result<StateRef, Rejection>> {
        self.transition_to_with(target, None, 0)
    }

    pub(crate) fn start_redirect(&self, from: Transition, target: TargetState, depth: u32) {
        let service = self.clone();
        tokio::spawn(async move {
            let _ = service
                .transition_to_with(target, Some(from), depth)
                .await;
        });
    }

    fn transition_to_with(
        &self,
        target: TargetState,
        redirected_from: Option<Transition>,
        redirect_depth: u32,
    ) -> BoxFuture<'static, Result<StateRef, Rejection>> {
        let Some(router) = self.router() else {
            let rejection = Rejection::error(Value::String("Router has been disposed".into()));
            return futures_util::future::ready(Err(rejection)).boxed();
        };
        if router.is_disposed() {
            let rejection = Rejection::error(Value::String("Router has been disposed".into()));
            return futures_util::future::ready(Err(rejection)).boxed();
        }

        let target = self.resolve_target(target);
        if !target.is_valid() {
            let detail = Value::String(
                target
                    .error_message()
                    .unwrap_or("invalid target state")
                    .to_string(),
            );
            let rejection = Rejection::invalid(detail);
            self.handle_rejection(&rejection);
            return futures_util::future::ready(Err(rejection)).boxed();
        }
        let target = self.inherit_params(&router, target);
        if let Some(message) = invalid_param_values(&target) {
            let rejection = Rejection::invalid(Value::String(message));
            self.handle_rejection(&rejection);
            return futures_util::future::ready(Err(rejection)).boxed();
        }

        let from_path = router.globals().current_path();
        let trans = match router.transition_service().create(
            &router,
            target,
            &from_path,
            redirected_from,
            redirect_depth,
        ) {
            Ok(trans) => trans,
            Err(detail) => {
                let rejection = Rejection::error(detail);
                self.handle_rejection(&rejection);
                return futures_util::future::ready(Err(rejection)).boxed();
            }
        };

        // Supersession: an equivalent repeat joins the pending transition;
        // anything else pushes the pending one aside.
        if let Some(pending) = router.globals().transition() {
            if pending.result().is_none() {
                if trans.is_equivalent(&pending) {
                    debug!(id = pending.id(), "equivalent transition already pending");
                    return pending.promise().boxed();
                }
                // settle the superseded promise now so its callers observe
                // the rejection before the new transition completes
                let rejection = Rejection::superseded(Some(Value::String(format!(
                    "superseded by transition #{}",
                    trans.id()
                ))));
                pending.abort_with(rejection.clone());
                pending.settle(Err(rejection));
            }
        }

        router.globals().set_pending(&trans);
        tokio::spawn(crate::transition::run_transition(router, trans.clone()));
        trans.promise().boxed()
    }

    /// Merge current parameter values under the target's, for parameters
    /// that opted into inheritance.
    fn inherit_params(&self, router: &Router, target: TargetState) -> TargetState {
        if !target.options().inherit {
            return target;
        }
        let Some(state) = target.state().cloned() else {
            return target;
        };
        let current = router.globals().params();
        let mut params = target.params().clone();
        for (id, param) in state.parameters(true) {
            if param.inherits() && !params.contains_key(&id) {
                if let Some(value) = current.get(&id) {
                    params.insert(id, value.clone());
                }
            }
        }
        target.with_params(params)
    }

    // ── Hrefs ───────────────────────────────────────────────────────────────

    /// A display URL for a state, or `None` when the state (chain) has no
    /// URL or a value fails its type check.
    pub fn href(&self, name: &str, params: HashMap<String, Value>) -> Option<String> {
        let router = self.router()?;
        let state = router.state_registry().matcher().find(name, None).ok()??;
        let navigable = state.navigable()?;
        let matcher = navigable.url()?;

        let mut merged = router.globals().params();
        merged.extend(params);
        matcher.format(&merged)
    }

    /// Like [`href`](StateService::href), with protocol, host, port, and
    /// base path composed from the location config.
    pub fn href_absolute(&self, name: &str, params: HashMap<String, Value>) -> Option<String> {
        let router = self.router()?;
        let url = self.href(name, params)?;
        let config = router.url_service().location_config().clone();
        let (protocol, host, port) = (config.protocol(), config.host(), config.port());
        let base = config.base_href();
        let base = base.trim_end_matches('/');
        let origin = match (protocol.as_str(), port) {
            ("http", 80) | ("https", 443) => format!("{protocol}://{host}"),
            _ => format!("{protocol}://{host}:{port}"),
        };
        Some(format!("{origin}{base}{url}"))
    }

    // ── Lazy loading ────────────────────────────────────────────────────────

    /// Load a lazy state's content by name. Concurrent calls share one
    /// load; a failed load clears the cached future so the next call
    /// retries.
    pub fn lazy_load(&self, name: &str) -> BoxFuture<'static, Result<LazyLoadResult, Value>> {
        let Some(router) = self.router() else {
            return futures_util::future::ready(Err(Value::String("Router has been dropped".into())))
                .boxed();
        };
        let found = router.state_registry().matcher().find(name, None);
        match found {
            Ok(Some(state)) => self.lazy_load_state(&state, None),
            _ => futures_util::future::ready(Err(Value::String(format!("No such state '{name}'"))))
                .boxed(),
        }
    }

    pub(crate) fn lazy_load_state(
        &self,
        state: &StateRef,
        trans: Option<&Transition>,
    ) -> BoxFuture<'static, Result<LazyLoadResult, Value>> {
        let mut slot = state.lazy.lock().expect("lazy slot lock");
        if let Some(inflight) = &slot.inflight {
            return inflight.clone().boxed();
        }
        let Some(func) = slot.func.clone() else {
            return futures_util::future::ready(Err(Value::String(format!(
                "state '{}' has no lazy loader",
                state.name()
            ))))
            .boxed();
        };

        let service = self.clone();
        let state_for_task = state.clone();
        let trans = trans.cloned();
        let load: BoxFuture<'static, Result<LazyLoadResult, Value>> = async move {
            let result = func(trans).await;
            match &result {
                Ok(loaded) => {
                    debug!(
                        state = %state_for_task.name(),
                        count = loaded.states.len(),
                        "lazy load complete"
                    );
                    if let Some(router) = service.router() {
                        for decl in &loaded.states {
                            if let Err(e) = router.state_registry().register(decl.clone()) {
                                warn!(state = %decl.name, error = %e, "lazy-loaded state rejected");
                            }
                        }
                    }
                    state_for_task.clear_lazy_load();
                }
                Err(_) => {
                    // clear the cached future so a later attempt retries
                    let mut slot = state_for_task.lazy.lock().expect("lazy slot lock");
                    slot.inflight = None;
                }
            }
            result
        }
        .boxed();

        let shared: SharedLazyLoad = load.shared();
        slot.inflight = Some(shared.clone());
        drop(slot);
        shared.boxed()
    }

    // ── Error handling ──────────────────────────────────────────────────────

    /// Replace the default error handler (a single sink; the previous one
    /// is dropped).
    pub fn default_error_handler(&self, handler: impl Fn(&Rejection) + Send + Sync + 'static) {
        *self
            .inner
            .default_error_handler
            .write()
            .expect("error handler lock") = Arc::new(handler);
    }

    /// Route a rejection to the default handler if its kind qualifies
    /// (`Superseded`/`Aborted`/`Ignored` are normal control flow).
    pub(crate) fn handle_rejection(&self, rejection: &Rejection) {
        if !rejection.reaches_default_handler() {
            return;
        }
        let handler = self
            .inner
            .default_error_handler
            .read()
            .expect("error handler lock")
            .clone();
        handler(rejection);
    }
}

/// Check a resolved target's parameter values against the destination's
/// full parameter schema (defaults applied first).
fn invalid_param_values(target: &TargetState) -> Option<String> {
    let state = target.state()?;
    for (id, param) in state.parameters(true) {
        let value = param.apply_default(target.params().get(&id).cloned());
        if !param.validates(&value) {
            return Some(format!(
                "Param values not valid for state '{}': '{}' = {}",
                state.name(),
                id,
                value
            ));
        }
    }
    None
}
