use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::resolve::ResolvedValue;

/// Narrow dependency-injection surface the router consumes and produces.
///
/// The router's own implementation (see
/// [`ResolveContext::injector`](crate::resolve::ResolveContext::injector))
/// serves resolvable tokens; host frameworks may wrap it to add their own
/// containers behind `get_native`.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an injector",
    label = "this type cannot serve dependency tokens",
    note = "implement `Injector` with `get` and `get_async`"
)]
pub trait Injector: Send + Sync {
    /// Synchronously fetch an already-available value for a token.
    fn get(&self, token: &str) -> Option<ResolvedValue>;

    /// Fetch a token, driving its resolution if necessary.
    fn get_async(&self, token: &str) -> BoxFuture<'static, Result<ResolvedValue, Value>>;

    /// Escape hatch to a host-native container; the core implementation
    /// has none.
    fn get_native(&self, _token: &str) -> Option<ResolvedValue> {
        None
    }
}
