use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::param::ParamDeclaration;
use crate::resolve::{ResolvableDecl, ResolvePolicyDefaults};
use crate::transition::{StateHookFn, Transition};

/// States produced by a lazy-load function.
#[derive(Clone, Default, Debug)]
pub struct LazyLoadResult {
    pub states: Vec<StateDeclaration>,
}

/// Loader attached to a future state (`name: "mod.**"`). Invoked at most
/// once successfully; the returned declarations replace the placeholder.
/// The triggering transition is passed when the load happens mid-
/// navigation; a direct `lazy_load(name)` call passes `None`.
pub type LazyLoadFn = Arc<
    dyn Fn(Option<Transition>) -> BoxFuture<'static, Result<LazyLoadResult, Value>> + Send + Sync,
>;

/// A concrete redirect destination.
#[derive(Clone, Debug)]
pub struct RedirectTarget {
    pub state: String,
    pub params: HashMap<String, Value>,
}

impl RedirectTarget {
    pub fn to(state: impl Into<String>) -> Self {
        RedirectTarget {
            state: state.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.params = params;
        self
    }
}

/// Redirection descriptor on a state: a fixed target, or a function that
/// decides per transition (returning `None` to let the transition stand).
#[derive(Clone)]
pub enum RedirectTo {
    To(RedirectTarget),
    Fn(Arc<dyn Fn(Transition) -> BoxFuture<'static, Result<Option<RedirectTarget>, Value>> + Send + Sync>),
}

impl fmt::Debug for RedirectTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectTo::To(t) => write!(f, "RedirectTo::To({:?})", t.state),
            RedirectTo::Fn(_) => write!(f, "RedirectTo::Fn(..)"),
        }
    }
}

/// A state as the host declares it.
///
/// Only `name` is required. A dotted name implies the parent (`a.b.c` is a
/// child of `a.b`) unless `parent` overrides it; a trailing `.**` marks a
/// future (lazy-loaded) state. Unknown host-framework fields travel in
/// `extras`, untouched by the core builder.
#[derive(Clone, Default)]
pub struct StateDeclaration {
    pub name: String,
    pub parent: Option<String>,
    pub url: Option<String>,
    pub params: HashMap<String, ParamDeclaration>,
    pub resolve: Vec<ResolvableDecl>,
    pub resolve_policy: ResolvePolicyDefaults,
    pub views: HashMap<String, Value>,
    pub data: serde_json::Map<String, Value>,
    pub on_enter: Option<StateHookFn>,
    pub on_retain: Option<StateHookFn>,
    pub on_exit: Option<StateHookFn>,
    pub redirect_to: Option<RedirectTo>,
    pub lazy_load: Option<LazyLoadFn>,
    pub is_abstract: bool,
    pub extras: HashMap<String, Value>,
}

impl fmt::Debug for StateDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDeclaration")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("url", &self.url)
            .field("abstract", &self.is_abstract)
            .finish()
    }
}

impl StateDeclaration {
    pub fn named(name: impl Into<String>) -> Self {
        StateDeclaration {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn param(mut self, id: impl Into<String>, decl: ParamDeclaration) -> Self {
        self.params.insert(id.into(), decl);
        self
    }

    pub fn resolve(mut self, decl: ResolvableDecl) -> Self {
        self.resolve.push(decl);
        self
    }

    pub fn resolve_policy(mut self, defaults: ResolvePolicyDefaults) -> Self {
        self.resolve_policy = defaults;
        self
    }

    pub fn view(mut self, name: impl Into<String>, config: Value) -> Self {
        self.views.insert(name.into(), config);
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn on_enter(mut self, hook: StateHookFn) -> Self {
        self.on_enter = Some(hook);
        self
    }

    pub fn on_retain(mut self, hook: StateHookFn) -> Self {
        self.on_retain = Some(hook);
        self
    }

    pub fn on_exit(mut self, hook: StateHookFn) -> Self {
        self.on_exit = Some(hook);
        self
    }

    pub fn redirect_to(mut self, redirect: RedirectTo) -> Self {
        self.redirect_to = Some(redirect);
        self
    }

    pub fn lazy_load<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<Transition>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<LazyLoadResult, Value>> + Send + 'static,
    {
        self.lazy_load = Some(Arc::new(move |t| f(t).boxed()));
        self
    }

    pub fn abstract_state(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Whether the name marks this as a future-state placeholder.
    pub fn is_future(&self) -> bool {
        self.name.ends_with(".**")
    }

    /// The name a future state stands in for (`a.b.**` → `a.b`).
    pub fn future_root_name(&self) -> Option<&str> {
        self.name.strip_suffix(".**")
    }

    /// Parent name implied by the (dot-separated) name, unless overridden.
    pub fn parent_name(&self) -> Option<String> {
        if let Some(explicit) = &self.parent {
            return Some(explicit.clone());
        }
        let base = self.future_root_name().unwrap_or(&self.name);
        base.rsplit_once('.').map(|(parent, _)| parent.to_string())
    }
}
