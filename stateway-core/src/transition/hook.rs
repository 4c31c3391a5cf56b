//! Hook types: return-value contract, match criteria, and registered
//! hook records.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::state::{Glob, StateRef, TargetState};

use super::transition::Transition;

/// What a hook asks the pipeline to do next.
#[derive(Debug, Clone)]
pub enum HookResult {
    /// Keep going (a hook returning nothing, or `true`).
    Continue,
    /// Reject the transition as `Aborted` (a hook returning `false`).
    Cancel,
    /// Reject as `Superseded` and start a new transition to the target.
    Redirect(TargetState),
}

/// A hook's return value: immediate, or a future the pipeline awaits.
/// The `Err` side becomes an `Error` rejection carrying the value.
pub enum HookReturn {
    Value(Result<HookResult, Value>),
    Future(BoxFuture<'static, Result<HookResult, Value>>),
}

impl HookReturn {
    /// Continue immediately.
    pub fn ok() -> HookReturn {
        HookReturn::Value(Ok(HookResult::Continue))
    }

    /// Abort the transition.
    pub fn cancel() -> HookReturn {
        HookReturn::Value(Ok(HookResult::Cancel))
    }

    /// Redirect to another target.
    pub fn redirect(target: TargetState) -> HookReturn {
        HookReturn::Value(Ok(HookResult::Redirect(target)))
    }

    /// Fail the transition with an error detail.
    pub fn error(detail: impl Into<Value>) -> HookReturn {
        HookReturn::Value(Err(detail.into()))
    }

    /// Await a future for the final result.
    pub fn from_future<F>(fut: F) -> HookReturn
    where
        F: std::future::Future<Output = Result<HookResult, Value>> + Send + 'static,
    {
        HookReturn::Future(fut.boxed())
    }

    /// Await side-effect work, then continue.
    pub fn wait<F>(fut: F) -> HookReturn
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        HookReturn::Future(fut.map(|_| Ok(HookResult::Continue)).boxed())
    }

    pub(crate) async fn into_result(self) -> Result<HookResult, Value> {
        match self {
            HookReturn::Value(v) => v,
            HookReturn::Future(f) => f.await,
        }
    }
}

/// Callback signature for transition hooks. State-scoped phases (enter /
/// retain / exit) bind the per-state invocation's state as the second
/// argument; transition-scoped phases pass `None`.
pub type TransitionHookFn = Arc<dyn Fn(Transition, Option<StateRef>) -> HookReturn + Send + Sync>;

/// Callback signature for hooks declared directly on a state
/// (`onEnter` / `onRetain` / `onExit`).
pub type StateHookFn = Arc<dyn Fn(Transition, StateRef) -> HookReturn + Send + Sync>;

/// The phased lifecycle, in strict execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionHookPhase {
    Create,
    Before,
    Start,
    Exit,
    Retain,
    Enter,
    Finish,
    Success,
    Error,
}

impl TransitionHookPhase {
    /// Phases whose hooks are invoked once per matching state.
    pub fn is_state_scoped(self) -> bool {
        matches!(
            self,
            TransitionHookPhase::Exit | TransitionHookPhase::Retain | TransitionHookPhase::Enter
        )
    }
}

// ── Criteria ────────────────────────────────────────────────────────────────

/// One criterion against a state: a glob over the name, a predicate, or a
/// list of alternatives. `Any` (the default) matches everything, including
/// an empty entering/exiting list.
#[derive(Clone)]
pub enum StateMatch {
    Any,
    Glob(Glob),
    Predicate(Arc<dyn Fn(&StateRef) -> bool + Send + Sync>),
    AnyOf(Vec<StateMatch>),
}

impl fmt::Debug for StateMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateMatch::Any => write!(f, "Any"),
            StateMatch::Glob(g) => write!(f, "Glob({})", g.pattern()),
            StateMatch::Predicate(_) => write!(f, "Predicate(..)"),
            StateMatch::AnyOf(list) => write!(f, "AnyOf({list:?})"),
        }
    }
}

impl StateMatch {
    pub fn glob(pattern: impl Into<String>) -> StateMatch {
        StateMatch::Glob(Glob::new(pattern))
    }

    pub fn predicate(f: impl Fn(&StateRef) -> bool + Send + Sync + 'static) -> StateMatch {
        StateMatch::Predicate(Arc::new(f))
    }

    pub fn matches(&self, state: &StateRef) -> bool {
        match self {
            StateMatch::Any => true,
            StateMatch::Glob(glob) => glob.matches(state.name()),
            StateMatch::Predicate(f) => f(state),
            StateMatch::AnyOf(list) => list.iter().any(|m| m.matches(state)),
        }
    }

    fn is_any(&self) -> bool {
        matches!(self, StateMatch::Any)
    }

    /// Does any state in the slice match? `Any` matches even an empty
    /// slice (an unconstrained criterion never disqualifies a hook).
    fn matches_some(&self, states: &[StateRef]) -> bool {
        if self.is_any() {
            return true;
        }
        states.iter().any(|s| self.matches(s))
    }
}

impl From<&str> for StateMatch {
    fn from(pattern: &str) -> StateMatch {
        if pattern == "**" {
            StateMatch::Any
        } else {
            StateMatch::glob(pattern)
        }
    }
}

impl From<String> for StateMatch {
    fn from(pattern: String) -> StateMatch {
        StateMatch::from(pattern.as_str())
    }
}

static ANY_MATCH: StateMatch = StateMatch::Any;

/// Which transitions a hook applies to.
///
/// All criteria default to `Any`; each specified criterion must hold.
/// `to`/`from` test the transition's endpoints; `entering`, `retained`,
/// and `exiting` test the corresponding path slices.
#[derive(Clone, Debug, Default)]
pub struct HookMatchCriteria {
    pub to_match: Option<StateMatch>,
    pub from_match: Option<StateMatch>,
    pub entering_match: Option<StateMatch>,
    pub retained_match: Option<StateMatch>,
    pub exiting_match: Option<StateMatch>,
}

impl HookMatchCriteria {
    pub fn new() -> HookMatchCriteria {
        HookMatchCriteria::default()
    }

    pub fn to(mut self, m: impl Into<StateMatch>) -> Self {
        self.to_match = Some(m.into());
        self
    }

    pub fn from(mut self, m: impl Into<StateMatch>) -> Self {
        self.from_match = Some(m.into());
        self
    }

    pub fn entering(mut self, m: impl Into<StateMatch>) -> Self {
        self.entering_match = Some(m.into());
        self
    }

    pub fn retained(mut self, m: impl Into<StateMatch>) -> Self {
        self.retained_match = Some(m.into());
        self
    }

    pub fn exiting(mut self, m: impl Into<StateMatch>) -> Self {
        self.exiting_match = Some(m.into());
        self
    }

    fn criterion(slot: &Option<StateMatch>) -> &StateMatch {
        slot.as_ref().unwrap_or(&ANY_MATCH)
    }

    /// The criterion governing a state-scoped phase.
    pub(crate) fn phase_criterion(&self, phase: TransitionHookPhase) -> &StateMatch {
        match phase {
            TransitionHookPhase::Enter => Self::criterion(&self.entering_match),
            TransitionHookPhase::Retain => Self::criterion(&self.retained_match),
            TransitionHookPhase::Exit => Self::criterion(&self.exiting_match),
            _ => &StateMatch::Any,
        }
    }

    /// Whole-transition match: every specified criterion must hold.
    pub fn matches(&self, trans: &Transition) -> bool {
        let tree = trans.tree_changes();
        let entering: Vec<StateRef> = tree.entering.iter().map(|n| n.state().clone()).collect();
        let retained: Vec<StateRef> = tree.retained.iter().map(|n| n.state().clone()).collect();
        let exiting: Vec<StateRef> = tree.exiting.iter().map(|n| n.state().clone()).collect();

        Self::criterion(&self.to_match).matches(&trans.to())
            && Self::criterion(&self.from_match).matches(&trans.from())
            && Self::criterion(&self.entering_match).matches_some(&entering)
            && Self::criterion(&self.retained_match).matches_some(&retained)
            && Self::criterion(&self.exiting_match).matches_some(&exiting)
    }
}

// ── Registered hooks ────────────────────────────────────────────────────────

/// Registration options.
#[derive(Debug, Clone, Default)]
pub struct HookRegOptions {
    /// Higher runs earlier within a phase; ties keep registration order.
    pub priority: i32,
    /// Deregister after this many invocations.
    pub invoke_limit: Option<u32>,
}

impl HookRegOptions {
    pub fn priority(priority: i32) -> Self {
        HookRegOptions {
            priority,
            ..Default::default()
        }
    }

    pub fn invoke_limit(mut self, limit: u32) -> Self {
        self.invoke_limit = Some(limit);
        self
    }
}

pub(crate) struct RegisteredHook {
    pub id: u64,
    pub criteria: HookMatchCriteria,
    pub callback: TransitionHookFn,
    pub options: HookRegOptions,
    pub invoke_count: AtomicU32,
}

impl RegisteredHook {
    pub fn can_invoke(&self) -> bool {
        match self.options.invoke_limit {
            Some(limit) => self.invoke_count.load(Ordering::SeqCst) < limit,
            None => true,
        }
    }

    pub fn record_invocation(&self) {
        self.invoke_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Synchronous creation-time hook: may mutate the transition; its return
/// value is ignored, but an `Err` aborts creation.
pub type CreateHookFn = Arc<dyn Fn(&Transition) -> Result<(), Value> + Send + Sync>;

pub(crate) struct RegisteredCreateHook {
    pub id: u64,
    pub criteria: HookMatchCriteria,
    pub callback: CreateHookFn,
    pub options: HookRegOptions,
}
