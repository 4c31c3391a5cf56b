//! Plugin system: composable units installed onto a router.

use crate::router::Router;

/// A composable unit of functionality installed with
/// [`Router::plugin`](crate::router::Router::plugin).
///
/// Plugins typically register hooks, rules, or decorators during
/// `install` and tear them down in `dispose`. Interior mutability is the
/// plugin's own concern; the router only holds a shared handle.
///
/// # Example
///
/// ```ignore
/// struct Audit;
///
/// impl RouterPlugin for Audit {
///     fn name(&self) -> &str {
///         "audit"
///     }
///
///     fn install(&self, router: &Router) {
///         router.transition_service().on_success(
///             HookMatchCriteria::new(),
///             |trans, _| {
///                 tracing::info!(to = %trans.to().name(), "navigated");
///                 HookReturn::ok()
///             },
///         );
///     }
/// }
/// ```
pub trait RouterPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn install(&self, router: &Router);

    fn dispose(&self, _router: &Router) {}
}
