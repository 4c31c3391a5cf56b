//! The composition root: owns every subsystem singleton and wires the
//! built-in hooks.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::info;

use crate::globals::RouterGlobals;
use crate::location::{LocationConfig, LocationServices, MemoryLocation};
use crate::param::ParamTypes;
use crate::plugin::RouterPlugin;
use crate::state::{StateRegistry, StateService, TargetState};
use crate::trace::Trace;
use crate::transition::{
    HookMatchCriteria, HookRegOptions, HookResult, HookReturn, Rejection, StateMatch,
    TransitionHookPhase, TransitionService, TransitionSource,
};
use crate::url::{RuleOutcome, UrlMatcherFactory, UrlRules, UrlService};
use crate::view::ViewService;

pub(crate) type WeakRouter = Weak<RouterInner>;

pub struct RouterInner {
    param_types: Arc<ParamTypes>,
    matcher_factory: Arc<UrlMatcherFactory>,
    url_rules: UrlRules,
    url_service: UrlService,
    registry: StateRegistry,
    transition_service: TransitionService,
    state_service: StateService,
    view_service: ViewService,
    globals: RouterGlobals,
    plugins: Mutex<Vec<Arc<dyn RouterPlugin>>>,
    disposed: AtomicBool,
    trace: Trace,
}

/// The router instance. Cheap to clone; all clones share one set of
/// services.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Assemble a router over a host-provided location.
    pub fn new(
        location: Arc<dyn LocationServices>,
        location_config: Arc<dyn LocationConfig>,
    ) -> Router {
        let param_types = Arc::new(ParamTypes::new());
        let matcher_factory = Arc::new(UrlMatcherFactory::new(param_types.clone()));
        let url_rules = UrlRules::new();
        let registry = StateRegistry::new(matcher_factory.clone(), url_rules.clone());
        let globals = RouterGlobals::new(registry.root().clone(), 1);

        let router = Router {
            inner: Arc::new(RouterInner {
                url_service: UrlService::new(url_rules.clone(), location, location_config),
                transition_service: TransitionService::new(),
                state_service: StateService::new(),
                view_service: ViewService::new(),
                param_types,
                matcher_factory,
                url_rules,
                registry,
                globals,
                plugins: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                trace: Trace::new(),
            }),
        };
        router.inner.state_service.attach(router.downgrade());
        router.inner.url_service.attach(router.downgrade());
        register_lazy_load_hook(&router);
        router
    }

    /// A router over an in-memory location (tests, headless hosts).
    /// Returns the location alongside for direct URL manipulation.
    pub fn with_memory_location() -> (Router, Arc<MemoryLocation>) {
        let location = Arc::new(MemoryLocation::new());
        (
            Router::new(location.clone(), location.clone()),
            location,
        )
    }

    pub(crate) fn from_inner(inner: Arc<RouterInner>) -> Router {
        Router { inner }
    }

    pub(crate) fn downgrade(&self) -> WeakRouter {
        Arc::downgrade(&self.inner)
    }

    // ── Services ────────────────────────────────────────────────────────────

    pub fn state_registry(&self) -> &StateRegistry {
        &self.inner.registry
    }

    pub fn state_service(&self) -> &StateService {
        &self.inner.state_service
    }

    pub fn transition_service(&self) -> &TransitionService {
        &self.inner.transition_service
    }

    pub fn url_service(&self) -> &UrlService {
        &self.inner.url_service
    }

    pub fn url_rules(&self) -> &UrlRules {
        &self.inner.url_rules
    }

    pub fn matcher_factory(&self) -> &Arc<UrlMatcherFactory> {
        &self.inner.matcher_factory
    }

    pub fn param_types(&self) -> &Arc<ParamTypes> {
        &self.inner.param_types
    }

    pub fn view_service(&self) -> &ViewService {
        &self.inner.view_service
    }

    pub fn globals(&self) -> &RouterGlobals {
        &self.inner.globals
    }

    pub fn trace(&self) -> &Trace {
        &self.inner.trace
    }

    // ── Plugins ─────────────────────────────────────────────────────────────

    /// Install a plugin; it is disposed with the router (or individually
    /// via [`dispose_plugin`](Router::dispose_plugin)).
    pub fn plugin(&self, plugin: Arc<dyn RouterPlugin>) {
        plugin.install(self);
        self.inner.plugins.lock().expect("plugins lock").push(plugin);
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn RouterPlugin>> {
        self.inner
            .plugins
            .lock()
            .expect("plugins lock")
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Dispose one plugin by name.
    pub fn dispose_plugin(&self, name: &str) -> bool {
        let plugin = {
            let mut plugins = self.inner.plugins.lock().expect("plugins lock");
            match plugins.iter().position(|p| p.name() == name) {
                Some(idx) => plugins.remove(idx),
                None => return false,
            }
        };
        plugin.dispose(self);
        true
    }

    // ── Disposal ────────────────────────────────────────────────────────────

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Tear the router down: stop URL listening, reject the in-flight
    /// transition with a rejection whose detail contains `"disposed"`,
    /// and dispose plugins. Later registrations are inert: `register`
    /// returns `ConfigError::Disposed`, `decorator` is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("router disposed");
        self.inner.url_service.listen(false);
        self.inner.registry.mark_disposed();
        if let Some(pending) = self.inner.globals.transition() {
            pending.abort_with(Rejection::error(Value::String(
                "Router has been disposed".into(),
            )));
        }
        let plugins: Vec<Arc<dyn RouterPlugin>> = {
            let mut plugins = self.inner.plugins.lock().expect("plugins lock");
            plugins.drain(..).collect()
        };
        for plugin in plugins {
            plugin.dispose(self);
        }
    }
}

/// Future states load before the transition proceeds: the `onBefore` hook
/// drives the state's lazy loader, then redirects to the re-resolved
/// target (re-matching the URL when the transition came from it).
fn register_lazy_load_hook(router: &Router) {
    router.transition_service().on_phase_with(
        TransitionHookPhase::Before,
        HookMatchCriteria::new().to(StateMatch::predicate(|s| {
            s.is_future() || s.has_lazy_load()
        })),
        HookRegOptions::priority(1000),
        |trans, _| {
            HookReturn::from_future(async move {
                let Some(router) = trans.router() else {
                    return Ok(HookResult::Continue);
                };
                let to = trans.to();
                if !to.is_future() && !to.has_lazy_load() {
                    return Ok(HookResult::Continue);
                }
                router
                    .state_service()
                    .lazy_load_state(&to, Some(&trans))
                    .await?;

                let target = if trans.options().source == TransitionSource::Url {
                    let parts = router.url_service().parts();
                    router.url_service().match_url(&parts).and_then(|m| {
                        match m.rule.handle(&m.value, &parts) {
                            RuleOutcome::Target(target) => Some(target),
                            _ => None,
                        }
                    })
                } else {
                    Some(TargetState::new(
                        trans.target_state().name(),
                        trans.target_state().params().clone(),
                        trans.options().clone(),
                    ))
                };
                match target {
                    Some(target) => Ok(HookResult::Redirect(target)),
                    None => Ok(HookResult::Continue),
                }
            })
        },
    );
}
