use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::services::{LocationChangeFn, LocationConfig, LocationServices, Unsubscribe};

type ListenerList = Arc<Mutex<Vec<(u64, LocationChangeFn)>>>;

struct MemoryInner {
    url: String,
    history: Vec<String>,
}

/// In-memory location: a url string, a history vector, and synchronous
/// change notification. The reference implementation for tests and
/// headless hosts; also implements [`LocationConfig`] with fixed values.
pub struct MemoryLocation {
    inner: Mutex<MemoryInner>,
    listeners: ListenerList,
    next_listener_id: AtomicU64,
    hash_prefix: RwLock<String>,
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLocation {
    pub fn new() -> MemoryLocation {
        MemoryLocation {
            inner: Mutex::new(MemoryInner {
                url: String::new(),
                history: vec![String::new()],
            }),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
            hash_prefix: RwLock::new(String::new()),
        }
    }

    /// The history entries recorded so far (oldest first).
    pub fn history(&self) -> Vec<String> {
        self.inner.lock().expect("memory location lock").history.clone()
    }

    fn notify(&self, url: &str) {
        let listeners = self.listeners.lock().expect("listeners lock").clone();
        for (_, cb) in listeners {
            cb(url);
        }
    }
}

impl LocationServices for MemoryLocation {
    fn url(&self) -> String {
        self.inner.lock().expect("memory location lock").url.clone()
    }

    fn set_url(&self, url: &str, replace: bool) {
        {
            let mut inner = self.inner.lock().expect("memory location lock");
            if inner.url == url {
                return;
            }
            inner.url = url.to_string();
            if replace {
                inner.history.pop();
            }
            inner.history.push(url.to_string());
        }
        self.notify(url);
    }

    fn on_change(&self, cb: LocationChangeFn) -> Unsubscribe {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().expect("listeners lock").push((id, cb));
        let listeners = self.listeners.clone();
        Box::new(move || {
            listeners
                .lock()
                .expect("listeners lock")
                .retain(|(lid, _)| *lid != id);
        })
    }
}

impl LocationConfig for MemoryLocation {
    fn port(&self) -> u16 {
        80
    }

    fn protocol(&self) -> String {
        "http".to_string()
    }

    fn host(&self) -> String {
        "localhost".to_string()
    }

    fn base_href(&self) -> String {
        "/".to_string()
    }

    fn html5_mode(&self) -> bool {
        false
    }

    fn hash_prefix(&self) -> String {
        self.hash_prefix.read().expect("hash prefix lock").clone()
    }

    fn set_hash_prefix(&self, prefix: &str) {
        *self.hash_prefix.write().expect("hash prefix lock") = prefix.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn set_url_pushes_history() {
        let loc = MemoryLocation::new();
        loc.set_url("/a", false);
        loc.set_url("/b", false);
        assert_eq!(loc.url(), "/b");
        assert_eq!(loc.history(), vec!["", "/a", "/b"]);
    }

    #[test]
    fn replace_overwrites_top_entry() {
        let loc = MemoryLocation::new();
        loc.set_url("/a", false);
        loc.set_url("/b", true);
        assert_eq!(loc.history(), vec!["", "/b"]);
    }

    #[test]
    fn listeners_fire_and_unsubscribe() {
        let loc = MemoryLocation::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let unsub = loc.on_change(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        loc.set_url("/a", false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        unsub();
        loc.set_url("/b", false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn setting_same_url_is_a_no_op() {
        let loc = MemoryLocation::new();
        loc.set_url("/a", false);
        loc.set_url("/a", false);
        assert_eq!(loc.history(), vec!["", "/a"]);
    }

    #[test]
    fn parts_split_from_url() {
        let loc = MemoryLocation::new();
        loc.set_url("/a/b?x=1#frag", false);
        assert_eq!(loc.path(), "/a/b");
        assert_eq!(loc.search()["x"], vec!["1"]);
        assert_eq!(loc.hash(), "frag");
    }
}
