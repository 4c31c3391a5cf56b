use std::collections::HashMap;
use std::sync::Arc;

use crate::url::UrlParts;

/// Callback for external URL changes; receives the new url
/// (`path?search#hash`).
pub type LocationChangeFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Unsubscribe closure returned by [`LocationServices::on_change`].
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// The narrow surface the URL subsystem calls into. Hosts provide one of
/// the reference implementations or their own.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a location provider",
    label = "this type cannot back the router's URL",
    note = "implement `LocationServices` (url/set_url/on_change)"
)]
pub trait LocationServices: Send + Sync {
    /// The current url (`path?search#hash`, no origin, no base).
    fn url(&self) -> String;

    /// Set the url, pushing or replacing a history entry.
    fn set_url(&self, url: &str, replace: bool);

    /// Subscribe to external changes. The callback also fires for changes
    /// made through `set_url`.
    fn on_change(&self, cb: LocationChangeFn) -> Unsubscribe;

    fn path(&self) -> String {
        UrlParts::parse(&self.url()).path
    }

    fn search(&self) -> HashMap<String, Vec<String>> {
        UrlParts::parse(&self.url()).search
    }

    fn hash(&self) -> String {
        UrlParts::parse(&self.url()).hash
    }
}

/// Host-environment facts the URL subsystem reads (and, for the hash
/// prefix, writes).
pub trait LocationConfig: Send + Sync {
    fn port(&self) -> u16;
    fn protocol(&self) -> String;
    fn host(&self) -> String;
    fn base_href(&self) -> String;
    fn html5_mode(&self) -> bool;
    fn hash_prefix(&self) -> String;
    fn set_hash_prefix(&self, prefix: &str);
}

/// Parse a `<base href>` value into the path prefix the router strips:
/// the origin is dropped, a path ending in `/` is kept as-is, and a
/// trailing filename is cut back to its directory.
pub fn parse_base_href(href: &str) -> String {
    let path = match url::Url::parse(href) {
        Ok(absolute) => absolute.path().to_string(),
        Err(_) => href.to_string(),
    };
    if path.is_empty() {
        return "/".to_string();
    }
    if path.ends_with('/') {
        return path;
    }
    match path.rsplit_once('/') {
        Some(("", _file)) => "/".to_string(),
        Some((dir, _file)) => format!("{dir}/"),
        None => "/".to_string(),
    }
}
