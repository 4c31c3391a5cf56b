//! The phase executor: drives one transition through its lifecycle.
//!
//! Phase order is strict: `onBefore`, `onStart`, `redirectTo`, eager
//! resolves, exits (deepest first), retains, entries (shallowest first,
//! each state's resolves completing before its enter hooks), `onFinish`,
//! then `onSuccess` or `onError`. Interruption (abort, supersession,
//! disposal) is checked between every hook invocation and resolve step.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::resolve::{ResolveErrorSink, ResolveWhen};
use crate::router::Router;
use crate::state::{RedirectTarget, RedirectTo, StateRef, TargetState};
use crate::trace::TraceCategory;
use crate::transition::TransitionOptions;

use super::hook::{HookResult, TransitionHookPhase};
use super::rejection::Rejection;
use super::transition::Transition;

pub(crate) async fn run(router: Router, trans: Transition) {
    info!(
        id = trans.id(),
        from = %trans.from().name(),
        to = %trans.to().name(),
        dynamic = trans.dynamic(),
        "transition started"
    );
    router.trace().log(TraceCategory::Transition, || {
        format!(
            "transition #{}: '{}' -> '{}'",
            trans.id(),
            trans.from().name(),
            trans.to().name()
        )
    });
    match run_phases(&router, &trans).await {
        Ok(()) => finalize_success(&router, &trans).await,
        Err(rejection) => finalize_failure(&router, &trans, rejection).await,
    }
}

async fn run_phases(router: &Router, trans: &Transition) -> Result<(), Rejection> {
    // Ignore semantics: no meaningful change and no reload requested.
    if trans.is_identity() && !trans.options().reload.is_reload() {
        return Err(Rejection::ignored(None));
    }

    invoke_phase(router, trans, TransitionHookPhase::Before, None).await?;
    invoke_phase(router, trans, TransitionHookPhase::Start, None).await?;

    // redirectTo on the destination state
    if let Some(redirect) = trans.to().redirect_to().cloned() {
        if let Some(target) = evaluate_redirect_to(trans, redirect).await? {
            let target = TargetState::new(
                target.state,
                target.params,
                TransitionOptions::new(),
            );
            return Err(start_redirect(router, trans, target));
        }
    }

    // eager resolves for the whole destination path
    router.trace().log(TraceCategory::Resolve, || {
        format!("transition #{}: eager resolves", trans.id())
    });
    let ctx = trans.to_resolve_context();
    ctx.resolve_path(ResolveWhen::Eager, Some(error_sink(router)))
        .await?;
    check_interrupt(trans)?;

    // exits, deepest first
    for state in trans.exiting() {
        invoke_phase(router, trans, TransitionHookPhase::Exit, Some(state)).await?;
    }

    // retains
    for state in trans.retained() {
        invoke_phase(router, trans, TransitionHookPhase::Retain, Some(state)).await?;
    }

    // entries, shallowest first; a state's resolves complete before its
    // enter hooks run
    let entering = trans.entering();
    let to_path_names: Vec<String> = trans.with_tree(|t| {
        t.to.iter().map(|n| n.state().name().to_string()).collect()
    });
    for state in entering {
        if let Some(idx) = to_path_names.iter().position(|n| n == state.name()) {
            router.trace().log(TraceCategory::Resolve, || {
                format!("transition #{}: resolving '{}'", trans.id(), state.name())
            });
            ctx.resolve_node(idx, Some(error_sink(router))).await?;
        }
        check_interrupt(trans)?;
        invoke_phase(router, trans, TransitionHookPhase::Enter, Some(state)).await?;
    }

    invoke_phase(router, trans, TransitionHookPhase::Finish, None).await?;
    Ok(())
}

fn check_interrupt(trans: &Transition) -> Result<(), Rejection> {
    match trans.interruption() {
        Some(rejection) => Err(rejection),
        None => Ok(()),
    }
}

async fn invoke_phase(
    router: &Router,
    trans: &Transition,
    phase: TransitionHookPhase,
    bound: Option<StateRef>,
) -> Result<(), Rejection> {
    check_interrupt(trans)?;
    let hooks = router
        .transition_service()
        .matching_hooks(phase, trans, bound.as_ref());
    for hook in hooks {
        if !hook.can_invoke() {
            continue;
        }
        hook.record_invocation();
        debug!(id = trans.id(), phase = ?phase, state = ?bound.as_ref().map(|s| s.name().to_string()), "hook");
        router.trace().log(TraceCategory::Hook, || match &bound {
            Some(state) => format!("transition #{}: {phase:?} hook @ '{}'", trans.id(), state.name()),
            None => format!("transition #{}: {phase:?} hook", trans.id()),
        });
        let outcome = (hook.callback)(trans.clone(), bound.clone()).into_result().await;
        match outcome {
            Ok(HookResult::Continue) => {}
            Ok(HookResult::Cancel) => return Err(Rejection::aborted(None)),
            Ok(HookResult::Redirect(target)) => return Err(start_redirect(router, trans, target)),
            Err(detail) => return Err(Rejection::error(detail)),
        }
        check_interrupt(trans)?;
    }
    Ok(())
}

async fn evaluate_redirect_to(
    trans: &Transition,
    redirect: RedirectTo,
) -> Result<Option<RedirectTarget>, Rejection> {
    match redirect {
        RedirectTo::To(target) => Ok(Some(target)),
        RedirectTo::Fn(f) => f(trans.clone()).await.map_err(|detail| Rejection::error(detail)),
    }
}

/// Kick off a redirect and produce the rejection for the transition being
/// superseded. A chain deeper than 20 redirects fails instead.
fn start_redirect(router: &Router, trans: &Transition, target: TargetState) -> Rejection {
    let depth = trans.redirect_depth() + 1;
    if depth > 20 {
        let message = format!("Too many consecutive Transition redirects ({depth}+)");
        return Rejection::error(Value::String(message.clone())).with_message(message);
    }
    let detail = json!({ "redirected to": target.name() });
    router
        .state_service()
        .start_redirect(trans.clone(), target.as_redirect(), depth);
    Rejection::redirected(Some(detail))
}

fn error_sink(router: &Router) -> ResolveErrorSink {
    let weak = router.downgrade();
    std::sync::Arc::new(move |rejection: Rejection| {
        if let Some(router) = weak.upgrade().map(Router::from_inner) {
            router.state_service().handle_rejection(&rejection);
        }
    })
}

// ── Settling ────────────────────────────────────────────────────────────────

async fn finalize_success(router: &Router, trans: &Transition) {
    info!(id = trans.id(), to = %trans.to().name(), "transition succeeded");
    router.globals().apply_success(trans);
    router.url_service().write_back(trans);
    router.view_service().activate_for(trans);

    trans.settle(Ok(trans.to()));
    router.globals().clear_pending(trans);

    // every onSuccess hook runs; errors go to the default error handler,
    // redirects are ignored
    let hooks = router
        .transition_service()
        .matching_hooks(TransitionHookPhase::Success, trans, None);
    for hook in hooks {
        if !hook.can_invoke() {
            continue;
        }
        hook.record_invocation();
        let outcome = (hook.callback)(trans.clone(), None).into_result().await;
        if let Err(detail) = outcome {
            router
                .state_service()
                .handle_rejection(&Rejection::error(detail));
        }
    }
}

async fn finalize_failure(router: &Router, trans: &Transition, rejection: Rejection) {
    info!(id = trans.id(), kind = ?rejection.kind, "transition did not complete");
    trans.settle(Err(rejection.clone()));
    router.globals().clear_pending(trans);

    // every onError hook runs; their own errors go to the default handler
    let hooks = router
        .transition_service()
        .matching_hooks(TransitionHookPhase::Error, trans, None);
    for hook in hooks {
        if !hook.can_invoke() {
            continue;
        }
        hook.record_invocation();
        let outcome = (hook.callback)(trans.clone(), None).into_result().await;
        if let Err(detail) = outcome {
            router
                .state_service()
                .handle_rejection(&Rejection::error(detail));
        }
    }

    router.state_service().handle_rejection(&rejection);
}
