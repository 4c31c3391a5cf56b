//! Hook registration and transition creation.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::path::PathNode;
use crate::router::Router;
use crate::state::{StateRef, TargetState};

use super::hook::{
    CreateHookFn, HookMatchCriteria, HookRegOptions, HookReturn, RegisteredCreateHook,
    RegisteredHook, StateMatch, TransitionHookFn, TransitionHookPhase,
};
use super::transition::Transition;

struct TsInner {
    hooks: RwLock<HashMap<TransitionHookPhase, Vec<Arc<RegisteredHook>>>>,
    create_hooks: RwLock<Vec<Arc<RegisteredCreateHook>>>,
    next_id: AtomicU64,
}

/// Registry of transition hooks, and the factory for [`Transition`]s.
///
/// Hooks are matched per transition (and per state, for the enter /
/// retain / exit phases) and run in priority order, ties in registration
/// order. Each `on_*` method returns a [`HookHandle`] whose
/// `deregister()` removes the hook; dropping the handle leaves the hook
/// registered.
#[derive(Clone)]
pub struct TransitionService {
    inner: Arc<TsInner>,
}

impl Default for TransitionService {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionService {
    pub fn new() -> TransitionService {
        let service = TransitionService {
            inner: Arc::new(TsInner {
                hooks: RwLock::new(HashMap::new()),
                create_hooks: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        };
        service.register_state_declaration_hooks();
        service
    }

    /// The hooks a state declares inline (`on_enter` / `on_retain` /
    /// `on_exit`) run through ordinary registrations that match states
    /// carrying the callback.
    fn register_state_declaration_hooks(&self) {
        self.on_enter(
            HookMatchCriteria::new()
                .entering(StateMatch::predicate(|s| s.declaration().on_enter.is_some())),
            |trans: Transition, state: Option<StateRef>| {
                let state = state.expect("enter hooks bind a state");
                let hook = state.declaration().on_enter.clone().expect("criteria checked");
                hook(trans, state)
            },
        );
        self.on_retain(
            HookMatchCriteria::new()
                .retained(StateMatch::predicate(|s| s.declaration().on_retain.is_some())),
            |trans: Transition, state: Option<StateRef>| {
                let state = state.expect("retain hooks bind a state");
                let hook = state.declaration().on_retain.clone().expect("criteria checked");
                hook(trans, state)
            },
        );
        self.on_exit(
            HookMatchCriteria::new()
                .exiting(StateMatch::predicate(|s| s.declaration().on_exit.is_some())),
            |trans: Transition, state: Option<StateRef>| {
                let state = state.expect("exit hooks bind a state");
                let hook = state.declaration().on_exit.clone().expect("criteria checked");
                hook(trans, state)
            },
        );
    }

    // ── Registration ────────────────────────────────────────────────────────

    pub fn register_hook(
        &self,
        phase: TransitionHookPhase,
        criteria: HookMatchCriteria,
        options: HookRegOptions,
        callback: TransitionHookFn,
    ) -> HookHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let hook = Arc::new(RegisteredHook {
            id,
            criteria,
            callback,
            options,
            invoke_count: AtomicU32::new(0),
        });
        self.inner
            .hooks
            .write()
            .expect("hooks lock")
            .entry(phase)
            .or_default()
            .push(hook);
        HookHandle {
            id,
            phase: Some(phase),
            service: Arc::downgrade(&self.inner),
        }
    }

    /// Synchronous creation hook: runs while the transition is being
    /// created; an `Err` aborts creation.
    pub fn on_create(
        &self,
        criteria: HookMatchCriteria,
        callback: impl Fn(&Transition) -> Result<(), Value> + Send + Sync + 'static,
    ) -> HookHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let hook = Arc::new(RegisteredCreateHook {
            id,
            criteria,
            callback: Arc::new(callback) as CreateHookFn,
            options: HookRegOptions::default(),
        });
        self.inner
            .create_hooks
            .write()
            .expect("create hooks lock")
            .push(hook);
        HookHandle {
            id,
            phase: None,
            service: Arc::downgrade(&self.inner),
        }
    }

    pub fn on_before(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Before,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_start(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Start,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_exit(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Exit,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_retain(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Retain,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_enter(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Enter,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_finish(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Finish,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_success(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Success,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    pub fn on_error(
        &self,
        criteria: HookMatchCriteria,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(
            TransitionHookPhase::Error,
            criteria,
            HookRegOptions::default(),
            Arc::new(f),
        )
    }

    /// Registration variant with explicit options (`priority`,
    /// `invoke_limit`).
    pub fn on_phase_with(
        &self,
        phase: TransitionHookPhase,
        criteria: HookMatchCriteria,
        options: HookRegOptions,
        f: impl Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync + 'static,
    ) -> HookHandle {
        self.register_hook(phase, criteria, options, Arc::new(f))
    }

    // ── Matching ────────────────────────────────────────────────────────────

    /// The hooks to run for a phase of a transition, filtered by criteria
    /// and ordered by priority (descending), ties by registration order.
    /// For state-scoped phases the `bound` state must also satisfy the
    /// phase's criterion.
    pub(crate) fn matching_hooks(
        &self,
        phase: TransitionHookPhase,
        trans: &Transition,
        bound: Option<&StateRef>,
    ) -> Vec<Arc<RegisteredHook>> {
        let hooks = self.inner.hooks.read().expect("hooks lock");
        let Some(registered) = hooks.get(&phase) else {
            return Vec::new();
        };
        let mut matching: Vec<Arc<RegisteredHook>> = registered
            .iter()
            .filter(|h| h.criteria.matches(trans))
            .filter(|h| match bound {
                Some(state) => h.criteria.phase_criterion(phase).matches(state),
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by_key(|h| std::cmp::Reverse(h.options.priority));
        matching
    }

    // ── Creation ────────────────────────────────────────────────────────────

    /// Create a transition and run its `onCreate` hooks. An erroring hook
    /// aborts creation and no transition is returned.
    pub fn create(
        &self,
        router: &Router,
        target: TargetState,
        from_path: &[PathNode],
        redirected_from: Option<Transition>,
        redirect_depth: u32,
    ) -> Result<Transition, Value> {
        let trans = Transition::new(
            router.downgrade(),
            target,
            from_path,
            redirected_from,
            redirect_depth,
        );
        let create_hooks = self
            .inner
            .create_hooks
            .read()
            .expect("create hooks lock")
            .clone();
        for hook in create_hooks {
            if hook.criteria.matches(&trans) {
                (hook.callback)(&trans)?;
            }
        }
        tracing::debug!(id = trans.id(), to = %trans.to().name(), "transition created");
        Ok(trans)
    }
}

/// Deregistration handle for one hook. Dropping it leaves the hook in
/// place; `deregister()` removes it.
pub struct HookHandle {
    id: u64,
    phase: Option<TransitionHookPhase>,
    service: Weak<TsInner>,
}

impl HookHandle {
    pub fn deregister(self) {
        let Some(service) = self.service.upgrade() else {
            return;
        };
        match self.phase {
            Some(phase) => {
                if let Some(list) = service.hooks.write().expect("hooks lock").get_mut(&phase) {
                    list.retain(|h| h.id != self.id);
                }
            }
            None => {
                service
                    .create_hooks
                    .write()
                    .expect("create hooks lock")
                    .retain(|h| h.id != self.id);
            }
        }
    }
}
