//! The URL service: glues the rule engine to a location provider and
//! drives URL-initiated transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

use crate::location::{LocationConfig, LocationServices, Unsubscribe};
use crate::router::{Router, WeakRouter};
use crate::trace::TraceCategory;
use crate::transition::{LocationUpdate, Transition, TransitionSource};

use super::rule::{RuleOutcome, UrlParts};
use super::rules::{MatchResult, UrlRules};

struct UsInner {
    rules: UrlRules,
    location: Arc<dyn LocationServices>,
    location_config: Arc<dyn LocationConfig>,
    router: RwLock<Option<WeakRouter>>,
    listener: Mutex<Option<Unsubscribe>>,
    defer: AtomicBool,
}

/// Reads and writes the location, matches URLs against the rule list, and
/// dispatches the winning rule's outcome.
#[derive(Clone)]
pub struct UrlService {
    inner: Arc<UsInner>,
}

impl UrlService {
    pub(crate) fn new(
        rules: UrlRules,
        location: Arc<dyn LocationServices>,
        location_config: Arc<dyn LocationConfig>,
    ) -> UrlService {
        UrlService {
            inner: Arc::new(UsInner {
                rules,
                location,
                location_config,
                router: RwLock::new(None),
                listener: Mutex::new(None),
                defer: AtomicBool::new(false),
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

    /// The rule registry (`when` / `otherwise` / `initial` / `rule`).
    pub fn rules(&self) -> &UrlRules {
        &self.inner.rules
    }

    pub fn location_config(&self) -> &Arc<dyn LocationConfig> {
        &self.inner.location_config
    }

    // ── Location passthrough ────────────────────────────────────────────────

    pub fn url(&self) -> String {
        self.inner.location.url()
    }

    pub fn set_url(&self, url: &str, replace: bool) {
        self.inner.location.set_url(url, replace);
    }

    pub fn path(&self) -> String {
        self.inner.location.path()
    }

    pub fn search(&self) -> HashMap<String, Vec<String>> {
        self.inner.location.search()
    }

    pub fn hash(&self) -> String {
        self.inner.location.hash()
    }

    pub fn parts(&self) -> UrlParts {
        UrlParts::parse(&self.url())
    }

    // ── Matching & syncing ──────────────────────────────────────────────────

    /// Match url parts against the registered rules (no side effects).
    pub fn match_url(&self, parts: &UrlParts) -> Option<MatchResult> {
        self.inner.rules.match_url(parts)
    }

    /// Postpone URL interception: while deferred, location changes and
    /// `listen` do not trigger `sync`. Hosts call `sync()` themselves once
    /// their states are registered.
    pub fn defer_intercept(&self, defer: bool) {
        self.inner.defer.store(defer, Ordering::SeqCst);
    }

    pub fn is_intercept_deferred(&self) -> bool {
        self.inner.defer.load(Ordering::SeqCst)
    }

    /// Subscribe to (or drop the subscription to) location changes; each
    /// change re-evaluates the rules.
    pub fn listen(&self, enabled: bool) {
        let mut listener = self.inner.listener.lock().expect("listener lock");
        match (enabled, listener.take()) {
            (true, None) => {
                let service = self.clone();
                *listener = Some(self.inner.location.on_change(Arc::new(move |_url: &str| {
                    if !service.is_intercept_deferred() {
                        service.sync();
                    }
                })));
            }
            (true, Some(existing)) => *listener = Some(existing),
            (false, Some(unsubscribe)) => unsubscribe(),
            (false, None) => {}
        }
    }

    /// Evaluate the current URL against the rules and dispatch the best
    /// match; with no match, consult `initial` (first evaluation of an
    /// empty path) or `otherwise`.
    pub fn sync(&self) {
        let parts = self.parts();
        if let Some(router) = self.router() {
            router.trace().log(TraceCategory::Url, || {
                format!("sync: '{}'", parts.path)
            });
        }
        let matched = self.match_url(&parts);
        let outcome = match matched {
            Some(m) => m.rule.handle(&m.value, &parts),
            None => {
                let Some(fallback) = self.fallback_rule(&parts) else {
                    debug!(path = %parts.path, "no url rule matched");
                    return;
                };
                match fallback.matches(&parts) {
                    Some(value) => fallback.handle(&value, &parts),
                    None => return,
                }
            }
        };
        self.dispatch(outcome);
    }

    fn fallback_rule(&self, parts: &UrlParts) -> Option<Arc<super::rule::UrlRule>> {
        let initial_applies = (parts.path.is_empty() || parts.path == "/")
            && self
                .router()
                .map(|r| r.globals().started_count() == 0)
                .unwrap_or(false);
        if initial_applies {
            if let Some(rule) = self.inner.rules.initial_rule() {
                return Some(rule);
            }
        }
        self.inner.rules.otherwise_rule()
    }

    fn dispatch(&self, outcome: RuleOutcome) {
        match outcome {
            RuleOutcome::Redirect(url) => {
                // URL-sourced matches rewrite in place of the bad entry
                self.set_url(&url, true);
            }
            RuleOutcome::Target(target) => {
                if let Some(router) = self.router() {
                    let promise = router.state_service().transition_to(target);
                    tokio::spawn(async move {
                        let _ = promise.await;
                    });
                }
            }
            RuleOutcome::Handled => {}
        }
    }

    /// Write the destination URL after a successful transition, unless
    /// the transition came from the URL or opted out.
    pub(crate) fn write_back(&self, trans: &Transition) {
        if trans.options().source == TransitionSource::Url {
            return;
        }
        let replace = match trans.options().location {
            LocationUpdate::None => return,
            LocationUpdate::Replace => true,
            LocationUpdate::Push => false,
        };
        let Some(navigable) = trans.to().navigable() else {
            return;
        };
        let Some(matcher) = navigable.url() else {
            return;
        };
        if let Some(url) = matcher.format(&trans.params()) {
            debug!(url = %url, replace, "url write-back");
            self.set_url(&url, replace);
        }
    }
}
