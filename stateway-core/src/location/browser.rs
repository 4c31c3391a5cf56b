//! Browser-backed locations over a minimal [`BrowserPort`].
//!
//! The core never touches a DOM; hosts implement `BrowserPort` with a
//! handful of reads and writes, and the hash / pushState locations build
//! the url codec on top of it.

use std::sync::Arc;

use super::services::{
    parse_base_href, LocationChangeFn, LocationConfig, LocationServices, Unsubscribe,
};

/// What a browser-like host must expose: the full address, a way to
/// rewrite it (with or without a new history entry), and change events.
pub trait BrowserPort: Send + Sync {
    /// Full address, e.g. `http://host:8080/app/inbox?x=1#frag`.
    fn href(&self) -> String;

    fn set_href(&self, href: &str, replace: bool);

    /// Popstate / hashchange subscription; the callback receives the new
    /// full address.
    fn on_location_change(&self, cb: LocationChangeFn) -> Unsubscribe;

    fn protocol(&self) -> String;
    fn host(&self) -> String;
    fn port(&self) -> u16;

    /// The document's `<base href>`, if any.
    fn base_element_href(&self) -> Option<String>;
}

fn origin(port: &dyn BrowserPort) -> String {
    let protocol = port.protocol();
    let host = port.host();
    match (protocol.as_str(), port.port()) {
        ("http", 80) | ("https", 443) => format!("{protocol}://{host}"),
        (_, p) => format!("{protocol}://{host}:{p}"),
    }
}

/// Hash-fragment addressing: the router url lives after `#<prefix>` and
/// the page path never changes.
pub struct HashLocation {
    port: Arc<dyn BrowserPort>,
    prefix: std::sync::RwLock<String>,
}

impl HashLocation {
    pub fn new(port: Arc<dyn BrowserPort>) -> HashLocation {
        HashLocation {
            port,
            prefix: std::sync::RwLock::new(String::new()),
        }
    }

    fn split(&self, href: &str) -> String {
        let prefix = self.hash_prefix();
        match href.split_once('#') {
            Some((_, fragment)) => fragment
                .strip_prefix(prefix.as_str())
                .unwrap_or(fragment)
                .to_string(),
            None => String::new(),
        }
    }
}

impl LocationServices for HashLocation {
    fn url(&self) -> String {
        self.split(&self.port.href())
    }

    fn set_url(&self, url: &str, replace: bool) {
        let href = self.port.href();
        let page = href.split_once('#').map(|(p, _)| p).unwrap_or(&href);
        let prefix = self.hash_prefix();
        self.port
            .set_href(&format!("{page}#{prefix}{url}"), replace);
    }

    fn on_change(&self, cb: LocationChangeFn) -> Unsubscribe {
        let this_prefix = self.prefix.read().expect("hash prefix lock").clone();
        self.port.on_location_change(Arc::new(move |href: &str| {
            let fragment = match href.split_once('#') {
                Some((_, f)) => f.strip_prefix(this_prefix.as_str()).unwrap_or(f),
                None => "",
            };
            cb(fragment);
        }))
    }
}

impl LocationConfig for HashLocation {
    fn port(&self) -> u16 {
        self.port.port()
    }

    fn protocol(&self) -> String {
        self.port.protocol()
    }

    fn host(&self) -> String {
        self.port.host()
    }

    fn base_href(&self) -> String {
        self.port
            .base_element_href()
            .map(|href| parse_base_href(&href))
            .unwrap_or_else(|| "/".to_string())
    }

    fn html5_mode(&self) -> bool {
        false
    }

    fn hash_prefix(&self) -> String {
        self.prefix.read().expect("hash prefix lock").clone()
    }

    fn set_hash_prefix(&self, prefix: &str) {
        *self.prefix.write().expect("hash prefix lock") = prefix.to_string();
    }
}

/// html5 (pushState) addressing: the router url is the page path below
/// the `<base href>`.
pub struct PushStateLocation {
    port: Arc<dyn BrowserPort>,
}

impl PushStateLocation {
    pub fn new(port: Arc<dyn BrowserPort>) -> PushStateLocation {
        PushStateLocation { port }
    }

    fn strip(&self, href: &str) -> String {
        let origin = origin(self.port.as_ref());
        let without_origin = href.strip_prefix(&origin).unwrap_or(href);
        let base = self.base_href();
        let below_base = match without_origin.strip_prefix(&base) {
            Some(rest) => rest,
            // the base itself, without its trailing slash
            None => without_origin
                .strip_prefix(base.trim_end_matches('/'))
                .unwrap_or(without_origin),
        };
        if below_base.starts_with('/') {
            below_base.to_string()
        } else {
            format!("/{below_base}")
        }
    }
}

impl LocationServices for PushStateLocation {
    fn url(&self) -> String {
        self.strip(&self.port.href())
    }

    fn set_url(&self, url: &str, replace: bool) {
        let base = self.base_href();
        let joined = format!(
            "{}{}{}",
            origin(self.port.as_ref()),
            base.trim_end_matches('/'),
            url
        );
        self.port.set_href(&joined, replace);
    }

    fn on_change(&self, cb: LocationChangeFn) -> Unsubscribe {
        let port = self.port.clone();
        let this = PushStateLocation { port: port.clone() };
        self.port.on_location_change(Arc::new(move |href: &str| {
            cb(&this.strip(href));
        }))
    }
}

impl LocationConfig for PushStateLocation {
    fn port(&self) -> u16 {
        self.port.port()
    }

    fn protocol(&self) -> String {
        self.port.protocol()
    }

    fn host(&self) -> String {
        self.port.host()
    }

    fn base_href(&self) -> String {
        self.port
            .base_element_href()
            .map(|href| parse_base_href(&href))
            .unwrap_or_else(|| "/".to_string())
    }

    fn html5_mode(&self) -> bool {
        true
    }

    fn hash_prefix(&self) -> String {
        String::new()
    }

    fn set_hash_prefix(&self, _prefix: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct FakeBrowser {
        href: Mutex<String>,
        base: Option<String>,
        listeners: Arc<Mutex<Vec<(u64, LocationChangeFn)>>>,
        next_id: AtomicU64,
    }

    impl FakeBrowser {
        fn new(href: &str, base: Option<&str>) -> Arc<FakeBrowser> {
            Arc::new(FakeBrowser {
                href: Mutex::new(href.to_string()),
                base: base.map(String::from),
                listeners: Arc::new(Mutex::new(Vec::new())),
                next_id: AtomicU64::new(0),
            })
        }
    }

    impl BrowserPort for FakeBrowser {
        fn href(&self) -> String {
            self.href.lock().unwrap().clone()
        }

        fn set_href(&self, href: &str, _replace: bool) {
            *self.href.lock().unwrap() = href.to_string();
            let listeners = self.listeners.lock().unwrap().clone();
            for (_, cb) in listeners {
                cb(href);
            }
        }

        fn on_location_change(&self, cb: LocationChangeFn) -> Unsubscribe {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.listeners.lock().unwrap().push((id, cb));
            let listeners = self.listeners.clone();
            Box::new(move || {
                listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
            })
        }

        fn protocol(&self) -> String {
            "http".into()
        }

        fn host(&self) -> String {
            "example.com".into()
        }

        fn port(&self) -> u16 {
            80
        }

        fn base_element_href(&self) -> Option<String> {
            self.base.clone()
        }
    }

    #[test]
    fn hash_location_reads_fragment() {
        let browser = FakeBrowser::new("http://example.com/app#!/inbox?x=1", None);
        let loc = HashLocation::new(browser);
        loc.set_hash_prefix("!");
        assert_eq!(loc.url(), "/inbox?x=1");
    }

    #[test]
    fn hash_location_writes_fragment_only() {
        let browser = FakeBrowser::new("http://example.com/app#!/inbox", None);
        let loc = HashLocation::new(browser.clone());
        loc.set_hash_prefix("!");
        loc.set_url("/sent", false);
        assert_eq!(browser.href(), "http://example.com/app#!/sent");
    }

    #[test]
    fn push_state_strips_origin_and_base() {
        let browser = FakeBrowser::new(
            "http://example.com/app/inbox?x=1",
            Some("http://example.com/app/index.html"),
        );
        let loc = PushStateLocation::new(browser);
        assert_eq!(loc.base_href(), "/app/");
        assert_eq!(loc.url(), "/inbox?x=1");
    }

    #[test]
    fn push_state_writes_below_base() {
        let browser = FakeBrowser::new("http://example.com/app/", Some("/app/"));
        let loc = PushStateLocation::new(browser.clone());
        loc.set_url("/sent", false);
        assert_eq!(browser.href(), "http://example.com/app/sent");
    }

    #[test]
    fn push_state_change_events_carry_router_url() {
        let browser = FakeBrowser::new("http://example.com/a", None);
        let loc = PushStateLocation::new(browser.clone());
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        let _unsub = loc.on_change(Arc::new(move |url: &str| {
            sink.lock().unwrap().push(url.to_string());
        }));
        browser.set_href("http://example.com/b?q=1", false);
        assert_eq!(seen.lock().unwrap().clone(), vec!["/b?q=1"]);
    }
}
