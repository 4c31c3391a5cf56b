//! Paths and tree-changes: ordered state/param snapshots and the
//! kept/entering/exiting partition between two of them.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::resolve::Resolvable;
use crate::state::StateRef;
use crate::transition::ReloadOption;

/// One state along a path, with the values of the parameters that state
/// owns and the state's resolvables.
///
/// The resolvable list is shared between clones of a node, so a
/// resolvable added mid-transition is visible through every view of the
/// path (`to`, `entering`, `retained`), and kept nodes can share the
/// previous transition's list wholesale.
#[derive(Clone)]
pub struct PathNode {
    state: StateRef,
    values: HashMap<String, Value>,
    resolvables: Arc<RwLock<Vec<Arc<Resolvable>>>>,
}

impl std::fmt::Debug for PathNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathNode")
            .field("state", &self.state.name())
            .field("values", &self.values)
            .finish()
    }
}

impl PathNode {
    /// Node with parameter values drawn from `params` (defaults applied
    /// for everything missing).
    pub fn new(state: StateRef, params: &HashMap<String, Value>) -> PathNode {
        let values = state
            .own_params()
            .iter()
            .map(|(id, param)| (id.clone(), param.apply_default(params.get(id).cloned())))
            .collect();
        PathNode {
            resolvables: Arc::new(RwLock::new(state.resolvables())),
            state,
            values,
        }
    }

    pub fn state(&self) -> &StateRef {
        &self.state
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn resolvables(&self) -> Vec<Arc<Resolvable>> {
        self.resolvables.read().expect("path resolvables lock").clone()
    }

    pub fn push_resolvable(&self, r: Arc<Resolvable>) {
        self.resolvables
            .write()
            .expect("path resolvables lock")
            .push(r);
    }

    /// Same node with this node's resolvables swapped in from another
    /// (used to share already-fetched values across transitions).
    fn sharing_resolvables_of(mut self, other: &PathNode) -> PathNode {
        self.resolvables = other.resolvables.clone();
        self
    }

    /// Do the non-dynamic parameters owned by this state hold equal values
    /// in both nodes?
    fn non_dynamic_params_equal(&self, other: &PathNode) -> bool {
        self.state.own_params().iter().all(|(id, param)| {
            if param.is_dynamic() {
                return true;
            }
            let a = self.values.get(id).cloned().unwrap_or(Value::Null);
            let b = other.values.get(id).cloned().unwrap_or(Value::Null);
            param.equals(&a, &b)
        })
    }

    /// Is any owned parameter (dynamic or not) different between the nodes?
    fn any_param_differs(&self, other: &PathNode) -> bool {
        self.state.own_params().iter().any(|(id, param)| {
            let a = self.values.get(id).cloned().unwrap_or(Value::Null);
            let b = other.values.get(id).cloned().unwrap_or(Value::Null);
            !param.equals(&a, &b)
        })
    }
}

/// Build the path for a state: one node per ancestor, root first.
pub fn path_for(state: &StateRef, params: &HashMap<String, Value>) -> Vec<PathNode> {
    state
        .path()
        .into_iter()
        .map(|s| PathNode::new(s, params))
        .collect()
}

/// Flatten a path's parameter values into one map (leaf values win).
pub fn path_params(path: &[PathNode]) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    for node in path {
        for (k, v) in node.values() {
            params.insert(k.clone(), v.clone());
        }
    }
    params
}

/// The partition of a `from`/`to` path pair.
///
/// `kept` (== `retained`) is the longest common prefix with equal states
/// and equal non-dynamic parameter values. `exiting` is stored
/// deepest-first (its reverse appended to `kept` reproduces `from`);
/// `entering` is shallowest-first.
#[derive(Clone, Debug)]
pub struct TreeChanges {
    pub from: Vec<PathNode>,
    pub to: Vec<PathNode>,
    pub retained: Vec<PathNode>,
    pub entering: Vec<PathNode>,
    pub exiting: Vec<PathNode>,
}

impl TreeChanges {
    /// Compute the partition. `reload` truncates the kept prefix: `All`
    /// re-enters everything, `State(name)` re-enters from that state down.
    pub fn compute(from: &[PathNode], to: Vec<PathNode>, reload: &ReloadOption) -> TreeChanges {
        let mut keep = 0usize;
        while keep < from.len() && keep < to.len() {
            let (f, t) = (&from[keep], &to[keep]);
            match reload {
                ReloadOption::All => break,
                ReloadOption::State(name) if t.state().name() == name => break,
                _ => {}
            }
            if !Arc::ptr_eq(f.state(), t.state()) {
                break;
            }
            if !f.non_dynamic_params_equal(t) {
                break;
            }
            keep += 1;
        }

        // Kept nodes carry the `to` parameter values but share the `from`
        // nodes' resolvables, so fetched data survives the transition.
        let to: Vec<PathNode> = to
            .into_iter()
            .enumerate()
            .map(|(i, node)| {
                if i < keep {
                    node.sharing_resolvables_of(&from[i])
                } else {
                    node
                }
            })
            .collect();

        let retained: Vec<PathNode> = to[..keep].to_vec();
        let entering: Vec<PathNode> = to[keep..].to_vec();
        let mut exiting: Vec<PathNode> = from[keep..].to_vec();
        exiting.reverse();

        TreeChanges {
            from: from.to_vec(),
            to,
            retained,
            entering,
            exiting,
        }
    }

    /// No state changes hands, but some parameter value differs.
    pub fn is_dynamic(&self) -> bool {
        self.entering.is_empty()
            && self.exiting.is_empty()
            && self
                .retained
                .iter()
                .zip(self.from.iter())
                .any(|(t, f)| t.any_param_differs(f))
    }

    /// No state changes hands and every parameter value is equal.
    pub fn is_identity(&self) -> bool {
        self.entering.is_empty()
            && self.exiting.is_empty()
            && !self
                .retained
                .iter()
                .zip(self.from.iter())
                .any(|(t, f)| t.any_param_differs(f))
    }
}
