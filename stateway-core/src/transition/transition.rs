use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tokio_util::sync::CancellationToken;

use crate::path::{path_params, PathNode, TreeChanges};
use crate::resolve::{Resolvable, ResolveContext, ResolveInjector};
use crate::router::{Router, WeakRouter};
use crate::state::{StateRef, TargetState};

use super::options::TransitionOptions;
use super::rejection::Rejection;

static NEXT_TRANSITION_ID: AtomicU64 = AtomicU64::new(0);

type PromiseFuture = Shared<BoxFuture<'static, Result<StateRef, Rejection>>>;

pub(crate) struct TransitionInner {
    id: u64,
    router: WeakRouter,
    target: TargetState,
    tree: RwLock<TreeChanges>,
    promise: PromiseFuture,
    completer: Mutex<Option<tokio::sync::oneshot::Sender<Result<StateRef, Rejection>>>>,
    result: OnceLock<Result<StateRef, Rejection>>,
    abort_token: CancellationToken,
    interruption: OnceLock<Rejection>,
    redirected_from: Option<Transition>,
    redirect_depth: u32,
}

/// One navigation attempt: an id, immutable path snapshots, a phased
/// lifecycle, and a promise.
///
/// Cheap to clone; hooks receive clones and may hold them across awaits.
#[derive(Clone)]
pub struct Transition {
    inner: Arc<TransitionInner>,
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.inner.id)
            .field("to", &self.to().name().to_string())
            .field("from", &self.from().name().to_string())
            .finish()
    }
}

impl Transition {
    pub(crate) fn new(
        router: WeakRouter,
        target: TargetState,
        from_path: &[PathNode],
        redirected_from: Option<Transition>,
        redirect_depth: u32,
    ) -> Transition {
        let to_state = target
            .state()
            .cloned()
            .expect("transition target must be resolved");
        let to_path = crate::path::path_for(&to_state, target.params());
        let tree = TreeChanges::compute(from_path, to_path, &target.options().reload);

        let (tx, rx) = tokio::sync::oneshot::channel::<Result<StateRef, Rejection>>();
        let promise: PromiseFuture = rx
            .map(|received| match received {
                Ok(result) => result,
                Err(_) => Err(Rejection::aborted(Some(Value::String(
                    "transition was dropped before settling".into(),
                )))),
            })
            .boxed()
            .shared();

        Transition {
            inner: Arc::new(TransitionInner {
                id: NEXT_TRANSITION_ID.fetch_add(1, Ordering::SeqCst),
                router,
                target,
                tree: RwLock::new(tree),
                promise,
                completer: Mutex::new(Some(tx)),
                result: OnceLock::new(),
                abort_token: CancellationToken::new(),
                interruption: OnceLock::new(),
                redirected_from,
                redirect_depth,
            }),
        }
    }

    /// Globally monotonic transition id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The owning router, while it is alive.
    pub fn router(&self) -> Option<Router> {
        self.inner.router.upgrade().map(Router::from_inner)
    }

    pub fn options(&self) -> &TransitionOptions {
        self.inner.target.options()
    }

    pub fn target_state(&self) -> &TargetState {
        &self.inner.target
    }

    /// The state navigated away from (leaf of the `from` path).
    pub fn from(&self) -> StateRef {
        let tree = self.inner.tree.read().expect("tree lock");
        tree.from
            .last()
            .map(|n| n.state().clone())
            .expect("from path contains at least the root")
    }

    /// The destination state.
    pub fn to(&self) -> StateRef {
        self.inner
            .target
            .state()
            .cloned()
            .expect("transition target is resolved")
    }

    pub fn tree_changes(&self) -> TreeChanges {
        self.inner.tree.read().expect("tree lock").clone()
    }

    pub(crate) fn with_tree<R>(&self, f: impl FnOnce(&TreeChanges) -> R) -> R {
        f(&self.inner.tree.read().expect("tree lock"))
    }

    pub fn entering(&self) -> Vec<StateRef> {
        self.with_tree(|t| t.entering.iter().map(|n| n.state().clone()).collect())
    }

    pub fn exiting(&self) -> Vec<StateRef> {
        self.with_tree(|t| t.exiting.iter().map(|n| n.state().clone()).collect())
    }

    pub fn retained(&self) -> Vec<StateRef> {
        self.with_tree(|t| t.retained.iter().map(|n| n.state().clone()).collect())
    }

    /// Destination parameter values (path-flattened).
    pub fn params(&self) -> HashMap<String, Value> {
        self.with_tree(|t| path_params(&t.to))
    }

    /// Origin parameter values.
    pub fn from_params(&self) -> HashMap<String, Value> {
        self.with_tree(|t| path_params(&t.from))
    }

    /// Every changed parameter is dynamic: no state is exited or entered.
    pub fn dynamic(&self) -> bool {
        self.with_tree(|t| t.is_dynamic())
    }

    pub(crate) fn is_identity(&self) -> bool {
        self.with_tree(|t| t.is_identity())
    }

    /// The transition this one redirected from, if any.
    pub fn redirected_from(&self) -> Option<&Transition> {
        self.inner.redirected_from.as_ref()
    }

    /// Walk the redirect chain back to the first transition.
    pub fn original_transition(&self) -> Transition {
        let mut current = self.clone();
        while let Some(prev) = current.redirected_from().cloned() {
            current = prev;
        }
        current
    }

    pub(crate) fn redirect_depth(&self) -> u32 {
        self.inner.redirect_depth
    }

    /// Two transitions are equivalent when they share the destination
    /// state, equal parameter values under each parameter's type, and the
    /// same reload option.
    pub fn is_equivalent(&self, other: &Transition) -> bool {
        if !Arc::ptr_eq(&self.to(), &other.to()) {
            return false;
        }
        if self.options().reload != other.options().reload {
            return false;
        }
        let (a, b) = (self.params(), other.params());
        self.to().parameters(true).values().all(|param| {
            let x = param.apply_default(a.get(param.id()).cloned());
            let y = param.apply_default(b.get(param.id()).cloned());
            param.equals(&x, &y)
        })
    }

    // ── Resolvables ─────────────────────────────────────────────────────────

    /// Add a resolvable to the destination path, attached at `state_name`
    /// (the root when empty). Typically called from `onCreate`/`onBefore`.
    pub fn add_resolvable(&self, resolvable: Resolvable, state_name: &str) {
        let tree = self.inner.tree.read().expect("tree lock");
        if let Some(node) = tree
            .to
            .iter()
            .find(|n| n.state().name() == state_name)
        {
            node.push_resolvable(Arc::new(resolvable));
        }
    }

    /// Injector over the destination path (or the origin path with
    /// `from = true`), scoped to the whole path.
    pub fn injector(&self, from: bool) -> ResolveInjector {
        let path = self.with_tree(|t| if from { t.from.clone() } else { t.to.clone() });
        ResolveContext::new(path).injector()
    }

    pub(crate) fn to_resolve_context(&self) -> ResolveContext {
        ResolveContext::new(self.with_tree(|t| t.to.clone()))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Cooperatively cancel: the current hook's continuation rejects with
    /// `Aborted` and no further hooks run.
    pub fn abort(&self) {
        self.abort_with(Rejection::aborted(None));
    }

    pub(crate) fn abort_with(&self, rejection: Rejection) {
        let _ = self.inner.interruption.set(rejection);
        self.inner.abort_token.cancel();
    }

    /// The pending interruption (abort or supersession), if any.
    pub(crate) fn interruption(&self) -> Option<Rejection> {
        if self.inner.abort_token.is_cancelled() {
            Some(
                self.inner
                    .interruption
                    .get()
                    .cloned()
                    .unwrap_or_else(|| Rejection::aborted(None)),
            )
        } else {
            None
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.abort_token.is_cancelled()
    }

    /// The transition's outcome promise. Clonable and awaitable by any
    /// number of callers.
    pub fn promise(&self) -> impl std::future::Future<Output = Result<StateRef, Rejection>> + Send + 'static {
        self.inner.promise.clone()
    }

    /// The settled outcome, once available.
    pub fn result(&self) -> Option<&Result<StateRef, Rejection>> {
        self.inner.result.get()
    }

    pub fn succeeded(&self) -> Option<bool> {
        self.result().map(|r| r.is_ok())
    }

    pub(crate) fn settle(&self, result: Result<StateRef, Rejection>) {
        if self.inner.result.set(result.clone()).is_err() {
            return;
        }
        if let Some(tx) = self.inner.completer.lock().expect("completer lock").take() {
            let _ = tx.send(result);
        }
    }
}
