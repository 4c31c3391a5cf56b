//! Resolution over a path slice: token lookup, dependency ordering, and
//! the per-policy drive loop.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::injector::Injector;
use crate::path::PathNode;
use crate::transition::Rejection;

use super::policy::{ResolvePolicy, ResolveWait, ResolveWhen};
use super::resolvable::{DepValues, Resolvable, ResolvedValue};

/// Sink for failures nobody awaits (`NoWait` resolvables).
pub type ResolveErrorSink = Arc<dyn Fn(Rejection) + Send + Sync>;

/// A slice of a state path, giving resolvables access to their
/// dependencies. Lookup walks leaf→root; a resolvable may only depend on
/// tokens available at its own node or above.
#[derive(Clone)]
pub struct ResolveContext {
    path: Arc<Vec<PathNode>>,
}

impl ResolveContext {
    pub fn new(path: Vec<PathNode>) -> ResolveContext {
        ResolveContext {
            path: Arc::new(path),
        }
    }

    pub fn path(&self) -> &[PathNode] {
        &self.path
    }

    /// Nearest resolvable for a token, searching from the leaf upward.
    /// Returns the resolvable and the index of the node owning it.
    pub fn get_resolvable(&self, token: &str) -> Option<(Arc<Resolvable>, usize)> {
        self.find_from(token, self.path.len().saturating_sub(1))
    }

    /// Nearest resolvable for a token visible from `node_idx`: the owning
    /// node or an ancestor.
    fn find_from(&self, token: &str, node_idx: usize) -> Option<(Arc<Resolvable>, usize)> {
        for idx in (0..=node_idx.min(self.path.len().saturating_sub(1))).rev() {
            if let Some(r) = self.path[idx]
                .resolvables()
                .iter()
                .find(|r| r.token() == token)
            {
                return Some((r.clone(), idx));
            }
        }
        None
    }

    fn effective_policy(&self, resolvable: &Resolvable, node_idx: usize) -> ResolvePolicy {
        self.path[node_idx]
            .state()
            .declaration()
            .resolve_policy
            .apply(resolvable.policy())
    }

    // ── Cycle / missing-dependency analysis ─────────────────────────────────

    /// Depth-first check that a resolvable's dependency closure is acyclic
    /// and fully present.
    fn check_graph(&self, token: &str, node_idx: usize) -> Result<(), Rejection> {
        let mut in_stack: Vec<String> = Vec::new();
        let mut done: HashSet<String> = HashSet::new();
        self.visit(token, node_idx, &mut in_stack, &mut done)
    }

    fn visit(
        &self,
        token: &str,
        node_idx: usize,
        in_stack: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Result<(), Rejection> {
        if done.contains(token) {
            return Ok(());
        }
        if in_stack.iter().any(|t| t == token) {
            let mut cycle = in_stack.clone();
            cycle.push(token.to_string());
            return Err(Rejection::error(Value::String(format!(
                "Cyclic resolve dependency: {}",
                cycle.join(" -> ")
            ))));
        }
        let Some((resolvable, idx)) = self.find_from(token, node_idx) else {
            return Err(Rejection::error(Value::String(format!(
                "No resolvable for token '{token}'"
            ))));
        };
        in_stack.push(token.to_string());
        for dep in resolvable.deps() {
            self.visit(dep, idx, in_stack, done)?;
        }
        in_stack.pop();
        done.insert(token.to_string());
        Ok(())
    }

    // ── Driving ─────────────────────────────────────────────────────────────

    /// Future for one token's resolved value, recursively ensuring its
    /// dependencies first. Assumes `check_graph` passed.
    fn ensure(&self, token: String, node_idx: usize) -> BoxFuture<'static, Result<ResolvedValue, Value>> {
        let ctx = self.clone();
        async move {
            let Some((resolvable, idx)) = ctx.find_from(&token, node_idx) else {
                return Err(Value::String(format!("No resolvable for token '{token}'")));
            };
            let mut dep_values = HashMap::new();
            for dep in resolvable.deps() {
                let value = ctx.ensure(dep.clone(), idx).await?;
                dep_values.insert(dep.clone(), value);
            }
            resolvable.resolve(DepValues::new(dep_values)).await
        }
        .boxed()
    }

    /// Resolve every resolvable in the path whose effective `when` policy
    /// matches, honoring each one's wait policy.
    ///
    /// `Wait`/`RxWait` resolvables block this future; `NoWait` ones are
    /// spawned, with failures routed to `error_sink`.
    pub async fn resolve_path(
        &self,
        when: ResolveWhen,
        error_sink: Option<ResolveErrorSink>,
    ) -> Result<(), Rejection> {
        let mut targets: Vec<(String, usize, ResolveWait)> = Vec::new();
        for (idx, node) in self.path.iter().enumerate() {
            for r in node.resolvables() {
                let policy = self.effective_policy(&r, idx);
                if policy.when == when {
                    targets.push((r.token().to_string(), idx, policy.wait));
                }
            }
        }
        self.resolve_targets(targets, error_sink).await
    }

    /// Resolve the resolvables of one node (all policies); used just
    /// before the node's state is entered.
    pub async fn resolve_node(
        &self,
        node_idx: usize,
        error_sink: Option<ResolveErrorSink>,
    ) -> Result<(), Rejection> {
        let Some(node) = self.path.get(node_idx) else {
            return Ok(());
        };
        let targets: Vec<(String, usize, ResolveWait)> = node
            .resolvables()
            .iter()
            .map(|r| {
                let policy = self.effective_policy(r, node_idx);
                (r.token().to_string(), node_idx, policy.wait)
            })
            .collect();
        self.resolve_targets(targets, error_sink).await
    }

    async fn resolve_targets(
        &self,
        targets: Vec<(String, usize, ResolveWait)>,
        error_sink: Option<ResolveErrorSink>,
    ) -> Result<(), Rejection> {
        for (token, idx, _) in &targets {
            self.check_graph(token, *idx)?;
        }
        for (token, idx, wait) in targets {
            debug!(token = %token, wait = ?wait, "resolve target");
            let fut = self.ensure(token.clone(), idx);
            match wait {
                ResolveWait::NoWait => {
                    let sink = error_sink.clone();
                    tokio::spawn(async move {
                        if let Err(detail) = fut.await {
                            warn!(token = %token, "no-wait resolvable failed");
                            if let Some(sink) = sink {
                                sink(Rejection::error(detail));
                            }
                        }
                    });
                }
                ResolveWait::Wait | ResolveWait::RxWait => {
                    fut.await.map_err(Rejection::error)?;
                }
            }
        }
        Ok(())
    }

    /// Synchronous-plus-async access to resolved values.
    pub fn injector(&self) -> ResolveInjector {
        ResolveInjector { ctx: self.clone() }
    }
}

/// [`Injector`] over a [`ResolveContext`]: `get` serves only cached
/// values, `get_async` drives resolution.
#[derive(Clone)]
pub struct ResolveInjector {
    ctx: ResolveContext,
}

impl Injector for ResolveInjector {
    fn get(&self, token: &str) -> Option<ResolvedValue> {
        self.ctx
            .get_resolvable(token)
            .and_then(|(r, _)| r.value())
    }

    fn get_async(&self, token: &str) -> BoxFuture<'static, Result<ResolvedValue, Value>> {
        let ctx = self.ctx.clone();
        let token = token.to_string();
        async move {
            let Some((_, idx)) = ctx.get_resolvable(&token) else {
                return Err(Value::String(format!("No resolvable for token '{token}'")));
            };
            ctx.check_graph(&token, idx)
                .map_err(|r| r.detail.unwrap_or(Value::Null))?;
            ctx.ensure(token, idx).await
        }
        .boxed()
    }
}
