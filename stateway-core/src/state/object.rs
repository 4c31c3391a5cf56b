use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use crate::param::Param;
use crate::resolve::Resolvable;
use crate::url::UrlMatcher;

use super::declaration::{LazyLoadFn, LazyLoadResult, RedirectTo, StateDeclaration};

/// Shared handle to a built state node.
pub type StateRef = Arc<StateObject>;

pub(crate) type SharedLazyLoad = Shared<BoxFuture<'static, Result<LazyLoadResult, Value>>>;

#[derive(Default)]
pub(crate) struct LazyLoadSlot {
    pub func: Option<LazyLoadFn>,
    pub inflight: Option<SharedLazyLoad>,
}

/// A built node in the state tree.
///
/// Nodes are immutable after building except for the resolvable list
/// (hooks may add entries) and the lazy-load slot (cleared after the first
/// successful load). Nodes hold parent pointers only; children are found
/// through the registry, so no reference cycles exist and dropping the
/// registry entry is enough to release a subtree.
pub struct StateObject {
    name: String,
    parent: Option<StateRef>,
    declaration: StateDeclaration,
    /// Full matcher from the root (parent matchers appended in order),
    /// present iff this state or an ancestor declared a url.
    url: Option<UrlMatcher>,
    /// Whether this state itself declared a url fragment.
    own_url: bool,
    /// Parameters owned by this state: url params + config-only params.
    params: HashMap<String, Param>,
    includes: HashSet<String>,
    data: serde_json::Map<String, Value>,
    is_abstract: bool,
    resolvables: RwLock<Vec<Arc<Resolvable>>>,
    pub(crate) lazy: Mutex<LazyLoadSlot>,
}

impl fmt::Debug for StateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateObject")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name().to_string()))
            .field("url", &self.url.as_ref().map(|m| m.pattern().to_string()))
            .field("abstract", &self.is_abstract)
            .finish()
    }
}

impl StateObject {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        parent: Option<StateRef>,
        declaration: StateDeclaration,
        url: Option<UrlMatcher>,
        own_url: bool,
        params: HashMap<String, Param>,
        includes: HashSet<String>,
        data: serde_json::Map<String, Value>,
        resolvables: Vec<Arc<Resolvable>>,
    ) -> StateObject {
        let lazy = LazyLoadSlot {
            func: declaration.lazy_load.clone(),
            inflight: None,
        };
        StateObject {
            is_abstract: declaration.is_abstract,
            name,
            parent,
            url,
            own_url,
            params,
            includes,
            data,
            resolvables: RwLock::new(resolvables),
            lazy: Mutex::new(lazy),
            declaration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    pub fn parent(&self) -> Option<&StateRef> {
        self.parent.as_ref()
    }

    pub fn declaration(&self) -> &StateDeclaration {
        &self.declaration
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_future(&self) -> bool {
        self.declaration.is_future()
    }

    /// The full URL matcher for this state (ancestors' matchers appended),
    /// if this state or an ancestor declared one.
    pub fn url(&self) -> Option<&UrlMatcher> {
        self.url.as_ref()
    }

    pub fn has_own_url(&self) -> bool {
        self.own_url
    }

    /// Ordered ancestors from the root to (and including) this state.
    pub fn path(self: &StateRef) -> Vec<StateRef> {
        let mut path = Vec::new();
        let mut cursor = Some(self.clone());
        while let Some(state) = cursor {
            cursor = state.parent.clone();
            path.push(state);
        }
        path.reverse();
        path
    }

    /// Nearest self-or-ancestor that declared a url. The implicit root's
    /// synthetic matcher does not count.
    pub fn navigable(self: &StateRef) -> Option<StateRef> {
        let mut cursor = Some(self.clone());
        while let Some(state) = cursor {
            if state.own_url && !state.is_root() {
                return Some(state);
            }
            cursor = state.parent.clone();
        }
        None
    }

    /// Is `name` this state or one of its ancestors?
    pub fn includes(&self, name: &str) -> bool {
        self.includes.contains(name)
    }

    pub fn includes_set(&self) -> &HashSet<String> {
        &self.includes
    }

    /// Host metadata, merged down the tree (child keys override).
    pub fn data(&self) -> &serde_json::Map<String, Value> {
        &self.data
    }

    pub fn views(&self) -> &HashMap<String, Value> {
        &self.declaration.views
    }

    pub fn redirect_to(&self) -> Option<&RedirectTo> {
        self.declaration.redirect_to.as_ref()
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    /// Parameters owned by this state.
    pub fn own_params(&self) -> &HashMap<String, Param> {
        &self.params
    }

    /// Parameters of this state and (optionally) all ancestors. A child
    /// redeclaring an ancestor's parameter id overrides it.
    pub fn parameters(self: &StateRef, inherit: bool) -> HashMap<String, Param> {
        if !inherit {
            return self.params.clone();
        }
        let mut merged = HashMap::new();
        for state in self.path() {
            for (id, param) in &state.params {
                merged.insert(id.clone(), param.clone());
            }
        }
        merged
    }

    pub fn parameter(self: &StateRef, id: &str, inherit: bool) -> Option<Param> {
        if let Some(p) = self.params.get(id) {
            return Some(p.clone());
        }
        if inherit {
            if let Some(parent) = self.parent() {
                return parent.parameter(id, true);
            }
        }
        None
    }

    // ── Resolvables ─────────────────────────────────────────────────────────

    pub fn resolvables(&self) -> Vec<Arc<Resolvable>> {
        self.resolvables.read().expect("resolvables lock").clone()
    }

    /// Attach an additional resolvable (hooks use this via
    /// `Transition::add_resolvable`).
    pub fn add_resolvable(&self, resolvable: Arc<Resolvable>) {
        self.resolvables
            .write()
            .expect("resolvables lock")
            .push(resolvable);
    }

    // ── Lazy loading ────────────────────────────────────────────────────────

    pub fn has_lazy_load(&self) -> bool {
        self.lazy.lock().expect("lazy slot lock").func.is_some()
    }

    /// Clear the loader after a successful load.
    pub(crate) fn clear_lazy_load(&self) {
        let mut slot = self.lazy.lock().expect("lazy slot lock");
        slot.func = None;
        slot.inflight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::declaration::StateDeclaration;

    fn bare(name: &str, parent: Option<StateRef>) -> StateRef {
        let mut includes: HashSet<String> = parent
            .as_ref()
            .map(|p| p.includes_set().clone())
            .unwrap_or_default();
        includes.insert(name.to_string());
        Arc::new(StateObject::new(
            name.to_string(),
            parent,
            StateDeclaration::named(name),
            None,
            false,
            HashMap::new(),
            includes,
            serde_json::Map::new(),
            Vec::new(),
        ))
    }

    #[test]
    fn path_runs_root_to_self() {
        let root = bare("", None);
        let a = bare("a", Some(root.clone()));
        let ab = bare("a.b", Some(a.clone()));
        let path = ab.path();
        let names: Vec<&str> = path.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["", "a", "a.b"]);
    }

    #[test]
    fn includes_covers_ancestors() {
        let root = bare("", None);
        let a = bare("a", Some(root));
        let ab = bare("a.b", Some(a));
        assert!(ab.includes("a"));
        assert!(ab.includes("a.b"));
        assert!(!ab.includes("b"));
    }
}
