use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::transition::TransitionOptions;

use super::object::StateRef;

/// An immutable navigation target: state identifier, parameter values,
/// and transition options, plus the resolution against the registry.
///
/// Built through `StateService::target` (which resolves the identifier)
/// or by URL rules. An unresolvable identifier yields an invalid target;
/// navigating to it rejects with `Invalid`.
#[derive(Clone)]
pub struct TargetState {
    identifier: String,
    params: HashMap<String, Value>,
    options: TransitionOptions,
    state: Option<StateRef>,
    error: Option<String>,
}

impl fmt::Debug for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetState")
            .field("identifier", &self.identifier)
            .field("resolved", &self.state.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl TargetState {
    /// An unresolved target; the state service resolves it before use.
    pub fn new(
        identifier: impl Into<String>,
        params: HashMap<String, Value>,
        options: TransitionOptions,
    ) -> TargetState {
        TargetState {
            identifier: identifier.into(),
            params,
            options,
            state: None,
            error: None,
        }
    }

    /// Target produced by a URL rule match.
    pub(crate) fn for_url_match(name: &str, params: HashMap<String, Value>) -> TargetState {
        TargetState::new(name, params, TransitionOptions::from_url())
    }

    pub fn name(&self) -> &str {
        &self.identifier
    }

    pub fn params(&self) -> &HashMap<String, Value> {
        &self.params
    }

    pub fn options(&self) -> &TransitionOptions {
        &self.options
    }

    /// The resolved state, if resolution succeeded.
    pub fn state(&self) -> Option<&StateRef> {
        self.state.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_some() && self.error.is_none()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    // ── Builders ────────────────────────────────────────────────────────────

    pub(crate) fn resolved(mut self, state: StateRef) -> TargetState {
        self.state = Some(state);
        self
    }

    pub(crate) fn unresolvable(mut self, error: impl Into<String>) -> TargetState {
        self.error = Some(error.into());
        self
    }

    /// Replace the parameter map.
    pub fn with_params(mut self, params: HashMap<String, Value>) -> TargetState {
        self.params = params;
        self
    }

    /// Merge additional parameters over the current map.
    pub fn with_merged_params(mut self, params: HashMap<String, Value>) -> TargetState {
        self.params.extend(params);
        self
    }

    pub fn with_options(mut self, options: TransitionOptions) -> TargetState {
        self.options = options;
        self
    }

    /// Re-target with redirect semantics (the new transition records
    /// `source = Redirect`).
    pub(crate) fn as_redirect(mut self) -> TargetState {
        self.options = self.options.redirected();
        self
    }
}
