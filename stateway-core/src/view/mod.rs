//! The view registry: abstract "ui-view" holes and the view configs a
//! successful transition activates.
//!
//! The core interprets nothing about a view config; it only routes the
//! opaque value a state declared to the hole whose address matches. A
//! view declared under key `name` in state `s` gets the address
//! `name@s`; a key already containing `@` is used verbatim.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::transition::Transition;

/// An activated view config: which state declared it, its normalized
/// address, and the host's opaque config value.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveViewConfig {
    pub state: String,
    pub address: String,
    pub config: Value,
}

/// Callback a registered ui-view receives on each sync: the config now
/// occupying the hole, or `None` when the hole goes empty.
pub type UiViewCallback = Arc<dyn Fn(Option<ActiveViewConfig>) + Send + Sync>;

struct UiViewRecord {
    address: String,
    callback: UiViewCallback,
}

struct ViewInner {
    views: DashMap<u64, UiViewRecord>,
    active: RwLock<Vec<ActiveViewConfig>>,
    next_id: AtomicU64,
}

/// Registry of ui-view holes and active view configs.
#[derive(Clone)]
pub struct ViewService {
    inner: Arc<ViewInner>,
}

impl Default for ViewService {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewService {
    pub fn new() -> ViewService {
        ViewService {
            inner: Arc::new(ViewInner {
                views: DashMap::new(),
                active: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a ui-view hole by address. The callback fires immediately
    /// with the currently matching config, then again on every sync.
    pub fn register_ui_view(
        &self,
        address: impl Into<String>,
        callback: UiViewCallback,
    ) -> UiViewHandle {
        let address = address.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        callback(self.config_for(&address));
        self.inner.views.insert(id, UiViewRecord { address, callback });
        UiViewHandle {
            id,
            views: Arc::downgrade(&self.inner),
        }
    }

    pub fn active_view_configs(&self) -> Vec<ActiveViewConfig> {
        self.inner.active.read().expect("active views lock").clone()
    }

    fn config_for(&self, address: &str) -> Option<ActiveViewConfig> {
        self.inner
            .active
            .read()
            .expect("active views lock")
            .iter()
            .find(|c| c.address == address)
            .cloned()
    }

    /// Rebuild the active configs from a successful transition's
    /// destination path, then sync every registered hole.
    pub(crate) fn activate_for(&self, trans: &Transition) {
        let mut active = Vec::new();
        for node in trans.with_tree(|t| t.to.clone()) {
            let state = node.state();
            for (key, config) in state.views() {
                let address = if key.contains('@') {
                    key.clone()
                } else {
                    format!("{}@{}", key, state.name())
                };
                active.push(ActiveViewConfig {
                    state: state.name().to_string(),
                    address,
                    config: config.clone(),
                });
            }
        }
        *self.inner.active.write().expect("active views lock") = active;
        self.sync();
    }

    /// Push each hole its current config.
    pub fn sync(&self) {
        for entry in self.inner.views.iter() {
            (entry.callback)(self.config_for(&entry.address));
        }
    }
}

/// Deregistration handle for a ui-view hole.
pub struct UiViewHandle {
    id: u64,
    views: Weak<ViewInner>,
}

impl UiViewHandle {
    pub fn deregister(self) {
        if let Some(views) = self.views.upgrade() {
            views.views.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn register_fires_immediately_with_none() {
        let service = ViewService::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        service.register_ui_view(
            "content@home",
            Arc::new(move |config| sink.lock().unwrap().push(config)),
        );
        assert_eq!(seen.lock().unwrap().as_slice(), &[None]);
    }

    #[test]
    fn deregistered_view_stops_receiving() {
        let service = ViewService::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let handle = service.register_ui_view(
            "x@y",
            Arc::new(move |_| {
                *sink.lock().unwrap() += 1;
            }),
        );
        handle.deregister();
        service.sync();
        assert_eq!(*seen.lock().unwrap(), 1); // only the registration call
    }
}
