//! The resolve graph: per-state asynchronous dependencies with
//! configurable eagerness and wait policies.

mod context;
mod policy;
mod resolvable;

pub use context::{ResolveContext, ResolveErrorSink, ResolveInjector};
pub use policy::{ResolvePolicy, ResolvePolicyDefaults, ResolveWait, ResolveWhen};
pub use resolvable::{
    DepValues, Resolvable, ResolvableDecl, ResolveFn, ResolveResult, ResolveReturn, ResolvedValue,
};
