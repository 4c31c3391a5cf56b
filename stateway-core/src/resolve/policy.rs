/// When a resolvable is fetched during a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveWhen {
    /// During `onStart`, for every transition, whether or not the owning
    /// state is entering.
    Eager,
    /// Just before the owning state is entered.
    #[default]
    Lazy,
}

/// How transition progress relates to the resolvable's future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveWait {
    /// Block the transition on completion.
    #[default]
    Wait,
    /// Fire the fetch but let the transition proceed; late failures go to
    /// the default error handler.
    NoWait,
    /// For stream-producing resolvables: block on the first emission.
    /// Future-producing resolvables degrade to `Wait`.
    RxWait,
}

/// Combined policy, either declared per-resolvable or defaulted per-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvePolicy {
    pub when: ResolveWhen,
    pub wait: ResolveWait,
}

impl ResolvePolicy {
    pub fn eager() -> Self {
        ResolvePolicy {
            when: ResolveWhen::Eager,
            ..Default::default()
        }
    }

    pub fn lazy() -> Self {
        ResolvePolicy::default()
    }

    pub fn no_wait(mut self) -> Self {
        self.wait = ResolveWait::NoWait;
        self
    }

    pub fn rx_wait(mut self) -> Self {
        self.wait = ResolveWait::RxWait;
        self
    }
}

/// Per-state defaults merged under each resolvable's own (partial) policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvePolicyDefaults {
    pub when: Option<ResolveWhen>,
    pub wait: Option<ResolveWait>,
}

impl ResolvePolicyDefaults {
    /// Merge an explicit policy (if any) over these defaults.
    pub fn apply(&self, explicit: Option<ResolvePolicy>) -> ResolvePolicy {
        match explicit {
            Some(policy) => policy,
            None => ResolvePolicy {
                when: self.when.unwrap_or_default(),
                wait: self.wait.unwrap_or_default(),
            },
        }
    }
}
