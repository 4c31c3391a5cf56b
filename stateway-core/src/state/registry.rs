//! The state registry: registration queue, flush, and lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::url::{RuleOutcome, UrlMatcherFactory, UrlParts, UrlRule, UrlRules};

use super::builder::{DecoratorFn, StateBuilder};
use super::declaration::StateDeclaration;
use super::matcher::StateMatcher;
use super::object::StateRef;
use super::target::TargetState;

/// Registry change notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRegistryEvent {
    Registered,
    Deregistered,
}

pub type StatesChangedFn = Arc<dyn Fn(StateRegistryEvent, &[StateDeclaration]) + Send + Sync>;

type ListenerList = Arc<Mutex<Vec<(u64, StatesChangedFn)>>>;

struct RegistryInner {
    factory: Arc<UrlMatcherFactory>,
    url_rules: UrlRules,
    states: Arc<RwLock<HashMap<String, StateRef>>>,
    queue: Mutex<Vec<StateDeclaration>>,
    builder: RwLock<StateBuilder>,
    listeners: ListenerList,
    next_listener_id: AtomicU64,
    rule_ids: Mutex<HashMap<String, u64>>,
    root: StateRef,
    matcher: StateMatcher,
    disposed: AtomicBool,
}

/// Accepts state declarations in any order, completes them through the
/// builder, and makes them queryable by name and glob.
///
/// A declaration whose parent is not yet registered waits in the queue as
/// an *orphan*; registering the parent later flushes it. Waiting orphans
/// are not an error.
#[derive(Clone)]
pub struct StateRegistry {
    inner: Arc<RegistryInner>,
}

impl StateRegistry {
    pub fn new(factory: Arc<UrlMatcherFactory>, url_rules: UrlRules) -> StateRegistry {
        let root: StateRef = Arc::new(StateBuilder::build_root(&factory));
        let states = Arc::new(RwLock::new(HashMap::from([(
            String::new(),
            root.clone(),
        )])));
        StateRegistry {
            inner: Arc::new(RegistryInner {
                factory,
                url_rules,
                matcher: StateMatcher::new(states.clone()),
                states,
                queue: Mutex::new(Vec::new()),
                builder: RwLock::new(StateBuilder::new()),
                listeners: Arc::new(Mutex::new(Vec::new())),
                next_listener_id: AtomicU64::new(0),
                rule_ids: Mutex::new(HashMap::new()),
                root,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// The implicit root state.
    pub fn root(&self) -> &StateRef {
        &self.inner.root
    }

    pub fn matcher(&self) -> &StateMatcher {
        &self.inner.matcher
    }

    pub(crate) fn mark_disposed(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
    }

    // ── Registration ────────────────────────────────────────────────────────

    /// Queue a declaration and flush.
    ///
    /// Returns the built state, or `None` when the declaration is waiting
    /// for its parent.
    pub fn register(&self, decl: StateDeclaration) -> Result<Option<StateRef>, ConfigError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ConfigError::Disposed);
        }
        validate_name(&decl.name)?;
        {
            let states = self.inner.states.read().expect("states lock");
            if states.contains_key(&decl.name) {
                return Err(ConfigError::DuplicateState(decl.name));
            }
            let queue = self.inner.queue.lock().expect("queue lock");
            if queue.iter().any(|d| d.name == decl.name) {
                return Err(ConfigError::DuplicateState(decl.name));
            }
        }
        let name = decl.name.clone();
        self.inner.queue.lock().expect("queue lock").push(decl);
        let registered = self.flush()?;
        if !registered.is_empty() {
            self.notify(StateRegistryEvent::Registered, &registered);
        }
        Ok(self
            .inner
            .states
            .read()
            .expect("states lock")
            .get(&name)
            .cloned())
    }

    /// Repeatedly build queued declarations until a full pass makes no
    /// progress; whatever remains stays queued as orphans.
    fn flush(&self) -> Result<Vec<StateRef>, ConfigError> {
        let mut registered = Vec::new();
        loop {
            let pending: Vec<StateDeclaration> = {
                let mut queue = self.inner.queue.lock().expect("queue lock");
                queue.drain(..).collect()
            };
            if pending.is_empty() {
                break;
            }
            let mut orphans = Vec::new();
            let mut progressed = false;
            let mut pending = pending.into_iter();
            while let Some(decl) = pending.next() {
                let parent = match decl.parent_name() {
                    None => Some(self.inner.root.clone()),
                    Some(parent_name) => self
                        .inner
                        .states
                        .read()
                        .expect("states lock")
                        .get(&parent_name)
                        .cloned(),
                };
                let Some(parent) = parent else {
                    orphans.push(decl);
                    continue;
                };
                match self.build_and_insert(decl, parent) {
                    Ok(state) => {
                        registered.push(state);
                        progressed = true;
                    }
                    Err(e) => {
                        // keep the rest of the queue intact
                        let mut queue = self.inner.queue.lock().expect("queue lock");
                        queue.extend(orphans);
                        queue.extend(pending);
                        return Err(e);
                    }
                }
            }
            let more = {
                let mut queue = self.inner.queue.lock().expect("queue lock");
                queue.extend(orphans);
                !queue.is_empty() && progressed
            };
            if !more {
                break;
            }
        }
        Ok(registered)
    }

    fn build_and_insert(
        &self,
        decl: StateDeclaration,
        parent: StateRef,
    ) -> Result<StateRef, ConfigError> {
        let name = decl.name.clone();
        if self
            .inner
            .states
            .read()
            .expect("states lock")
            .contains_key(&name)
        {
            return Err(ConfigError::DuplicateState(name));
        }

        // A concrete state replaces its future placeholder.
        let placeholder = self
            .inner
            .states
            .read()
            .expect("states lock")
            .values()
            .find(|s| s.is_future() && s.declaration().future_root_name() == Some(name.as_str()))
            .cloned();
        if let Some(future) = placeholder {
            debug!(future = %future.name(), state = %name, "future state replaced");
            self.remove_states(&[future]);
        }

        let state: StateRef = {
            let builder = self.inner.builder.read().expect("builder lock");
            Arc::new(builder.build(decl, Some(parent), &self.inner.factory)?)
        };
        self.inner
            .states
            .write()
            .expect("states lock")
            .insert(name.clone(), state.clone());
        self.attach_url_rule(&state);
        info!(state = %name, "state registered");
        Ok(state)
    }

    fn attach_url_rule(&self, state: &StateRef) {
        let Some(matcher) = state.url().cloned() else {
            return;
        };
        if !state.has_own_url() {
            return;
        }
        let rule = if state.is_future() {
            // Prefix rule: any URL under the placeholder's static prefix
            // targets the placeholder (the lazy-load hook takes it from
            // there).
            let prefix = matcher.static_prefix().to_string();
            let name = state.name().to_string();
            UrlRule::raw(move |parts: &UrlParts| {
                let hit = parts.path == prefix
                    || (parts.path.starts_with(&prefix)
                        && parts.path[prefix.len()..].starts_with('/'));
                hit.then(|| RuleOutcome::Target(TargetState::for_url_match(&name, HashMap::new())))
            })
        } else if state.is_abstract() {
            return;
        } else {
            UrlRule::for_state(state.name(), matcher)
        };
        let handle = self.inner.url_rules.rule(rule);
        self.inner
            .rule_ids
            .lock()
            .expect("rule ids lock")
            .insert(state.name().to_string(), handle.id());
    }

    // ── Deregistration ──────────────────────────────────────────────────────

    /// Remove a state and all its descendants (deepest first). Returns the
    /// removed states.
    pub fn deregister(&self, name: &str) -> Result<Vec<StateRef>, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::InvalidName(name.to_string()));
        }
        let exists = self
            .inner
            .states
            .read()
            .expect("states lock")
            .contains_key(name);
        if !exists {
            return Err(ConfigError::UnknownState(name.to_string()));
        }

        let mut doomed: Vec<StateRef> = self
            .inner
            .states
            .read()
            .expect("states lock")
            .values()
            .filter(|s| s.includes(name))
            .cloned()
            .collect();
        doomed.sort_by_key(|s| std::cmp::Reverse(s.path().len()));
        self.remove_states(&doomed);
        self.notify(StateRegistryEvent::Deregistered, &doomed);
        Ok(doomed)
    }

    fn remove_states(&self, states: &[StateRef]) {
        let mut map = self.inner.states.write().expect("states lock");
        let mut rule_ids = self.inner.rule_ids.lock().expect("rule ids lock");
        for state in states {
            map.remove(state.name());
            if let Some(rule_id) = rule_ids.remove(state.name()) {
                self.inner.url_rules.remove(rule_id);
            }
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    pub fn get_state(&self, name: &str) -> Option<StateRef> {
        self.inner
            .states
            .read()
            .expect("states lock")
            .get(name)
            .cloned()
    }

    /// The original declaration of a registered state.
    pub fn get(&self, name: &str) -> Option<StateDeclaration> {
        self.get_state(name).map(|s| s.declaration().clone())
    }

    /// Declarations of every registered state (root excluded), sorted by
    /// name.
    pub fn get_all(&self) -> Vec<StateDeclaration> {
        let states = self.inner.states.read().expect("states lock");
        let mut decls: Vec<StateDeclaration> = states
            .values()
            .filter(|s| !s.is_root())
            .map(|s| s.declaration().clone())
            .collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    /// States currently waiting for a parent.
    pub fn queued(&self) -> Vec<String> {
        self.inner
            .queue
            .lock()
            .expect("queue lock")
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    // ── Extension points ────────────────────────────────────────────────────

    /// Register a builder decorator for a property. No-ops after disposal.
    pub fn decorator(&self, property: &str, f: DecoratorFn) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.inner
            .builder
            .write()
            .expect("builder lock")
            .decorator(property, f);
    }

    /// Subscribe to registration changes. Fired synchronously after each
    /// mutation.
    pub fn on_states_changed(&self, f: StatesChangedFn) -> StatesChangedHandle {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .expect("listeners lock")
            .push((id, f));
        StatesChangedHandle {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    fn notify(&self, event: StateRegistryEvent, states: &[StateRef]) {
        let decls: Vec<StateDeclaration> =
            states.iter().map(|s| s.declaration().clone()).collect();
        let listeners = self.inner.listeners.lock().expect("listeners lock").clone();
        for (_, listener) in listeners {
            listener(event, &decls);
        }
    }
}

/// Handle for a `on_states_changed` subscription.
pub struct StatesChangedHandle {
    id: u64,
    listeners: Weak<Mutex<Vec<(u64, StatesChangedFn)>>>,
}

impl StatesChangedHandle {
    pub fn deregister(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .expect("listeners lock")
                .retain(|(id, _)| *id != self.id);
        }
    }
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let base = name.strip_suffix(".**").unwrap_or(name);
    let valid = !base.is_empty()
        && base.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn registry() -> StateRegistry {
        StateRegistry::new(Arc::new(UrlMatcherFactory::default()), UrlRules::new())
    }

    #[test]
    fn register_builds_immediately_with_known_parent() {
        let reg = registry();
        let a = reg.register(StateDeclaration::named("a")).unwrap();
        assert!(a.is_some());
        let ab = reg.register(StateDeclaration::named("a.b")).unwrap();
        assert_eq!(ab.unwrap().parent().unwrap().name(), "a");
    }

    #[test]
    fn orphan_waits_for_parent() {
        let reg = registry();
        let orphan = reg.register(StateDeclaration::named("a.b")).unwrap();
        assert!(orphan.is_none());
        assert_eq!(reg.queued(), vec!["a.b"]);

        reg.register(StateDeclaration::named("a")).unwrap();
        assert!(reg.get_state("a.b").is_some());
        assert!(reg.queued().is_empty());
    }

    #[test]
    fn orphan_chain_flushes_in_one_registration() {
        let reg = registry();
        reg.register(StateDeclaration::named("a.b.c")).unwrap();
        reg.register(StateDeclaration::named("a.b")).unwrap();
        assert!(reg.get_state("a.b.c").is_none());
        reg.register(StateDeclaration::named("a")).unwrap();
        assert!(reg.get_state("a").is_some());
        assert!(reg.get_state("a.b").is_some());
        assert!(reg.get_state("a.b.c").is_some());
    }

    #[test]
    fn duplicate_name_rejected() {
        let reg = registry();
        reg.register(StateDeclaration::named("a")).unwrap();
        let err = reg.register(StateDeclaration::named("a")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateState(n) if n == "a"));
    }

    #[test]
    fn invalid_names_rejected() {
        let reg = registry();
        for bad in ["", "a..b", ".a", "a b"] {
            let err = reg.register(StateDeclaration::named(bad)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidName(_)), "{bad}");
        }
    }

    #[test]
    fn concrete_state_replaces_future_placeholder() {
        let reg = registry();
        reg.register(StateDeclaration::named("mod.**")).unwrap();
        assert!(reg.get_state("mod.**").is_some());

        reg.register(StateDeclaration::named("mod")).unwrap();
        assert!(reg.get_state("mod.**").is_none());
        assert!(reg.get_state("mod").is_some());
    }

    #[test]
    fn deregister_removes_subtree_deepest_first() {
        let reg = registry();
        reg.register(StateDeclaration::named("a")).unwrap();
        reg.register(StateDeclaration::named("a.b")).unwrap();
        reg.register(StateDeclaration::named("a.b.c")).unwrap();
        reg.register(StateDeclaration::named("other")).unwrap();

        let removed = reg.deregister("a.b").unwrap();
        let names: Vec<&str> = removed.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a.b.c", "a.b"]);
        assert!(reg.get_state("a").is_some());
        assert!(reg.get_state("other").is_some());
    }

    #[test]
    fn deregister_unknown_state_fails() {
        let reg = registry();
        assert!(matches!(
            reg.deregister("ghost"),
            Err(ConfigError::UnknownState(_))
        ));
    }

    #[test]
    fn listeners_fire_on_changes() {
        let reg = registry();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handle = reg.on_states_changed(Arc::new(move |event, decls| {
            if event == StateRegistryEvent::Registered {
                seen.fetch_add(decls.len(), Ordering::SeqCst);
            }
        }));
        reg.register(StateDeclaration::named("a")).unwrap();
        reg.register(StateDeclaration::named("a.b")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        handle.deregister();
        reg.register(StateDeclaration::named("c")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn relative_find_through_matcher() {
        let reg = registry();
        reg.register(StateDeclaration::named("a")).unwrap();
        reg.register(StateDeclaration::named("a.b")).unwrap();
        let base = reg.get_state("a.b").unwrap();
        let found = reg.matcher().find("^", Some(&base)).unwrap().unwrap();
        assert_eq!(found.name(), "a");
        let sibling = reg.matcher().find("^.c", Some(&base)).unwrap();
        assert!(sibling.is_none());
    }

    #[test]
    fn future_state_matches_descendant_names() {
        let reg = registry();
        reg.register(StateDeclaration::named("mod.**")).unwrap();
        let hit = reg.matcher().find("mod.detail", None).unwrap().unwrap();
        assert_eq!(hit.name(), "mod.**");
    }
}
