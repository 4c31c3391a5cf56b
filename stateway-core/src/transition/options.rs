use serde_json::Value;
use std::collections::HashMap;

/// What initiated a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionSource {
    /// Programmatic (`go` / `transition_to`).
    #[default]
    Api,
    /// URL synchronization.
    Url,
    /// A hook or `redirectTo` redirected a prior transition here.
    Redirect,
}

/// How a successful transition updates the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationUpdate {
    /// Push a new history entry.
    #[default]
    Push,
    /// Replace the current history entry.
    Replace,
    /// Leave the URL alone.
    None,
}

/// Whether (and from where) retained states re-enter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReloadOption {
    /// Normal kept-path computation.
    #[default]
    No,
    /// Re-enter everything from the root.
    All,
    /// Re-enter from the named state down.
    State(String),
}

impl ReloadOption {
    pub fn is_reload(&self) -> bool {
        !matches!(self, ReloadOption::No)
    }
}

/// Options controlling one transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    pub location: LocationUpdate,
    /// Base state name for resolving relative targets.
    pub relative: Option<String>,
    /// Inherit current parameter values for matching inheritable params
    /// (defaults to true for programmatic navigation).
    pub inherit: bool,
    pub reload: ReloadOption,
    /// Host-defined options, passed through untouched.
    pub custom: HashMap<String, Value>,
    pub source: TransitionSource,
}

impl TransitionOptions {
    pub fn new() -> Self {
        TransitionOptions {
            inherit: true,
            ..Default::default()
        }
    }

    /// Options for a URL-sourced transition: no inheritance and no URL
    /// write-back.
    pub fn from_url() -> Self {
        TransitionOptions {
            inherit: false,
            location: LocationUpdate::None,
            source: TransitionSource::Url,
            ..Default::default()
        }
    }

    pub fn location(mut self, update: LocationUpdate) -> Self {
        self.location = update;
        self
    }

    pub fn relative(mut self, base: impl Into<String>) -> Self {
        self.relative = Some(base.into());
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn reload(mut self, reload: ReloadOption) -> Self {
        self.reload = reload;
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }

    pub(crate) fn redirected(mut self) -> Self {
        self.source = TransitionSource::Redirect;
        self
    }
}
