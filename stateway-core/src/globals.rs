//! Router-owned mutable state: the current path, the pending transition,
//! and bounded transition histories.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::path::{path_params, PathNode};
use crate::state::StateRef;
use crate::transition::Transition;

/// Fixed-capacity FIFO; enqueueing past the cap evicts the oldest entry.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedQueue<T> {
    pub fn new(capacity: usize) -> BoundedQueue<T> {
        BoundedQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn enqueue(&self, item: T) {
        let mut items = self.items.lock().expect("queue lock");
        while items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    pub fn peek_last(&self) -> Option<T> {
        self.items.lock().expect("queue lock").back().cloned()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().expect("queue lock").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct GlobalsState {
    current_state: StateRef,
    params: HashMap<String, Value>,
    current_path: Vec<PathNode>,
    pending: Option<Transition>,
}

/// The router's "current" view of the world.
///
/// The current path is replaced in a single assignment after a successful
/// transition; readers see either the old or the new path, never a
/// half-updated one.
pub struct RouterGlobals {
    state: RwLock<GlobalsState>,
    started: BoundedQueue<Transition>,
    successful: BoundedQueue<Transition>,
    started_total: AtomicU64,
}

impl RouterGlobals {
    pub(crate) fn new(root: StateRef, history_capacity: usize) -> RouterGlobals {
        let root_node = PathNode::new(root.clone(), &HashMap::new());
        RouterGlobals {
            state: RwLock::new(GlobalsState {
                current_state: root,
                params: HashMap::new(),
                current_path: vec![root_node],
                pending: None,
            }),
            started: BoundedQueue::new(history_capacity),
            successful: BoundedQueue::new(history_capacity),
            started_total: AtomicU64::new(0),
        }
    }

    /// The active state (the root until the first successful transition).
    pub fn current_state(&self) -> StateRef {
        self.state.read().expect("globals lock").current_state.clone()
    }

    /// The active parameter values.
    pub fn params(&self) -> HashMap<String, Value> {
        self.state.read().expect("globals lock").params.clone()
    }

    pub fn current_path(&self) -> Vec<PathNode> {
        self.state.read().expect("globals lock").current_path.clone()
    }

    /// The transition currently in flight, if any.
    pub fn transition(&self) -> Option<Transition> {
        self.state.read().expect("globals lock").pending.clone()
    }

    /// Recently started transitions (bounded).
    pub fn transition_history(&self) -> Vec<Transition> {
        self.started.snapshot()
    }

    /// Recently succeeded transitions (bounded).
    pub fn success_history(&self) -> Vec<Transition> {
        self.successful.snapshot()
    }

    /// Total transitions ever started on this router.
    pub fn started_count(&self) -> u64 {
        self.started_total.load(Ordering::SeqCst)
    }

    pub(crate) fn set_pending(&self, trans: &Transition) {
        self.state.write().expect("globals lock").pending = Some(trans.clone());
        self.started.enqueue(trans.clone());
        self.started_total.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn clear_pending(&self, trans: &Transition) {
        let mut state = self.state.write().expect("globals lock");
        if state.pending.as_ref().map(|p| p.id()) == Some(trans.id()) {
            state.pending = None;
        }
    }

    pub(crate) fn apply_success(&self, trans: &Transition) {
        let to_path = trans.with_tree(|t| t.to.clone());
        let params = path_params(&to_path);
        let mut state = self.state.write().expect("globals lock");
        state.current_state = trans.to();
        state.params = params;
        state.current_path = to_path;
        drop(state);
        self.successful.enqueue(trans.clone());
    }
}
