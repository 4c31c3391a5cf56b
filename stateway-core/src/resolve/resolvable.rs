use futures_core::Stream;
use futures_util::future::{BoxFuture, Shared};
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::policy::ResolvePolicy;

/// A resolved dependency value. Hosts downcast through [`DepValues::get`].
pub type ResolvedValue = Arc<dyn Any + Send + Sync>;

/// Resolution outcome; the error side carries an opaque detail that ends
/// up in a `Rejection` or at the default error handler.
pub type ResolveResult = Result<ResolvedValue, Value>;

/// What a resolve function returns: a one-shot future, or a stream whose
/// first emission is the value (`RxWait`).
pub enum ResolveReturn {
    Future(BoxFuture<'static, ResolveResult>),
    Stream(Pin<Box<dyn Stream<Item = ResolveResult> + Send>>),
}

impl ResolveReturn {
    /// Wrap an immediately-available value.
    pub fn value<T: Any + Send + Sync>(value: T) -> ResolveReturn {
        ResolveReturn::Future(futures_util::future::ready(Ok(Arc::new(value) as ResolvedValue)).boxed())
    }

    /// Wrap an immediate failure.
    pub fn error(detail: impl Into<Value>) -> ResolveReturn {
        ResolveReturn::Future(futures_util::future::ready(Err(detail.into())).boxed())
    }

    /// Wrap an async block producing a value.
    pub fn future<T, F>(fut: F) -> ResolveReturn
    where
        T: Any + Send + Sync,
        F: std::future::Future<Output = Result<T, Value>> + Send + 'static,
    {
        ResolveReturn::Future(
            fut.map(|r| r.map(|v| Arc::new(v) as ResolvedValue)).boxed(),
        )
    }
}

/// Dependency values handed to a resolve function, keyed by token.
#[derive(Clone, Default)]
pub struct DepValues {
    values: HashMap<String, ResolvedValue>,
}

impl DepValues {
    pub fn new(values: HashMap<String, ResolvedValue>) -> Self {
        DepValues { values }
    }

    /// Retrieve a dependency by token, downcast and cloned out.
    ///
    /// # Panics
    ///
    /// Panics if the token is missing or holds a different type. Resolve
    /// functions only run after their declared dependencies resolved, so a
    /// panic here means the declaration and the closure disagree.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, token: &str) -> T {
        self.values
            .get(token)
            .and_then(|v| v.downcast_ref::<T>())
            .unwrap_or_else(|| panic!("resolved value for token `{token}` is missing or has an unexpected type"))
            .clone()
    }

    pub fn try_get<T: Clone + Send + Sync + 'static>(&self, token: &str) -> Option<T> {
        self.values
            .get(token)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn raw(&self, token: &str) -> Option<ResolvedValue> {
        self.values.get(token).cloned()
    }
}

/// Signature of a resolve function: dependency values in, future (or
/// stream) of the resolved value out.
pub type ResolveFn = Arc<dyn Fn(DepValues) -> ResolveReturn + Send + Sync>;

type SharedResolve = Shared<BoxFuture<'static, ResolveResult>>;

#[derive(Default)]
struct ResolvableCache {
    resolved: bool,
    value: Option<ResolvedValue>,
    inflight: Option<SharedResolve>,
}

/// A named asynchronous dependency declared at a state.
///
/// The cache lives on the instance: once resolved, the value is reused for
/// every later transition that keeps the owning state, until the state is
/// deregistered. A failed resolution clears the in-flight future so the
/// next transition retries.
pub struct Resolvable {
    token: String,
    deps: Vec<String>,
    policy: Option<ResolvePolicy>,
    func: ResolveFn,
    owner: Option<String>,
    cache: Mutex<ResolvableCache>,
}

impl fmt::Debug for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.lock().expect("resolvable cache lock");
        f.debug_struct("Resolvable")
            .field("token", &self.token)
            .field("deps", &self.deps)
            .field("owner", &self.owner)
            .field("resolved", &cache.resolved)
            .finish()
    }
}

impl Resolvable {
    pub fn new(
        token: impl Into<String>,
        deps: Vec<String>,
        func: ResolveFn,
        policy: Option<ResolvePolicy>,
    ) -> Self {
        Resolvable {
            token: token.into(),
            deps,
            policy,
            func,
            owner: None,
            cache: Mutex::new(ResolvableCache::default()),
        }
    }

    /// A resolvable that already holds its value (seed data such as the
    /// transition itself).
    pub fn from_value(token: impl Into<String>, value: ResolvedValue) -> Self {
        let r = Resolvable::new(
            token,
            Vec::new(),
            Arc::new(move |_| ResolveReturn::Future(futures_util::future::ready(Err(Value::Null)).boxed())),
            None,
        );
        {
            let mut cache = r.cache.lock().expect("resolvable cache lock");
            cache.resolved = true;
            cache.value = Some(value);
        }
        r
    }

    pub(crate) fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = Some(owner.into());
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn policy(&self) -> Option<ResolvePolicy> {
        self.policy
    }

    pub fn is_resolved(&self) -> bool {
        self.cache.lock().expect("resolvable cache lock").resolved
    }

    /// The cached value, if resolution already completed.
    pub fn value(&self) -> Option<ResolvedValue> {
        self.cache.lock().expect("resolvable cache lock").value.clone()
    }

    /// Drive this resolvable with already-gathered dependency values.
    ///
    /// Deduplicates: concurrent calls share one underlying future. On
    /// failure the in-flight slot is cleared so a later call retries.
    /// Wait policy is the caller's concern; streams always resolve on
    /// their first emission.
    pub fn resolve(self: &Arc<Self>, deps: DepValues) -> BoxFuture<'static, ResolveResult> {
        let shared = {
            let mut cache = self.cache.lock().expect("resolvable cache lock");
            if cache.resolved {
                let value = cache.value.clone().expect("resolved cache holds a value");
                return futures_util::future::ready(Ok(value)).boxed();
            }
            if let Some(inflight) = &cache.inflight {
                return inflight.clone().boxed();
            }

            debug!(token = %self.token, owner = ?self.owner, "resolving");
            let raw = (self.func)(deps);
            let fut: BoxFuture<'static, ResolveResult> = match raw {
                ResolveReturn::Future(f) => f,
                ResolveReturn::Stream(mut stream) => async move {
                    match stream.next().await {
                        Some(item) => item,
                        None => Err(Value::String("resolve stream ended without emitting".into())),
                    }
                }
                .boxed(),
            };

            let this = Arc::downgrade(self);
            let settled: BoxFuture<'static, ResolveResult> = async move {
                let result = fut.await;
                if let Some(resolvable) = this.upgrade() {
                    let mut cache = resolvable.cache.lock().expect("resolvable cache lock");
                    match &result {
                        Ok(value) => {
                            cache.resolved = true;
                            cache.value = Some(value.clone());
                        }
                        Err(_) => {
                            // clear so the next transition can retry
                            cache.inflight = None;
                        }
                    }
                }
                result
            }
            .boxed();

            let shared = settled.shared();
            cache.inflight = Some(shared.clone());
            shared
        };

        shared.boxed()
    }
}

/// Declaration-side description of a resolvable; the state builder turns
/// this into a fresh [`Resolvable`] instance per registration.
#[derive(Clone)]
pub struct ResolvableDecl {
    pub token: String,
    pub deps: Vec<String>,
    pub policy: Option<ResolvePolicy>,
    pub func: ResolveFn,
}

impl fmt::Debug for ResolvableDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvableDecl")
            .field("token", &self.token)
            .field("deps", &self.deps)
            .finish()
    }
}

impl ResolvableDecl {
    pub fn new(
        token: impl Into<String>,
        deps: Vec<&str>,
        func: impl Fn(DepValues) -> ResolveReturn + Send + Sync + 'static,
    ) -> Self {
        ResolvableDecl {
            token: token.into(),
            deps: deps.into_iter().map(String::from).collect(),
            policy: None,
            func: Arc::new(func),
        }
    }

    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub(crate) fn build(&self, owner: &str) -> Arc<Resolvable> {
        let mut r = Resolvable::new(
            self.token.clone(),
            self.deps.clone(),
            self.func.clone(),
            self.policy,
        );
        r.set_owner(owner);
        Arc::new(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_resolvable(counter: Arc<AtomicUsize>, fail_first: bool) -> Arc<Resolvable> {
        let calls = counter.clone();
        Arc::new(Resolvable::new(
            "data",
            vec![],
            Arc::new(move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if fail_first && n == 0 {
                    ResolveReturn::error("boom")
                } else {
                    ResolveReturn::value(n)
                }
            }),
            None,
        ))
    }

    #[tokio::test]
    async fn value_is_cached_after_first_resolution() {
        let counter = Arc::new(AtomicUsize::new(0));
        let r = counted_resolvable(counter.clone(), false);

        let first = r.resolve(DepValues::default()).await.unwrap();
        let second = r.resolve(DepValues::default()).await.unwrap();
        assert_eq!(*first.downcast_ref::<usize>().unwrap(), 0);
        assert_eq!(*second.downcast_ref::<usize>().unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(r.is_resolved());
    }

    #[tokio::test]
    async fn concurrent_resolutions_share_one_future() {
        let counter = Arc::new(AtomicUsize::new(0));
        let r = counted_resolvable(counter.clone(), false);

        let (a, b) = futures_util::join!(
            r.resolve(DepValues::default()),
            r.resolve(DepValues::default())
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_clears_cache_and_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let r = counted_resolvable(counter.clone(), true);

        let first = r.resolve(DepValues::default()).await;
        assert!(first.is_err());
        assert!(!r.is_resolved());

        let second = r.resolve(DepValues::default()).await;
        assert!(second.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_resolves_on_first_emission() {
        let r = Arc::new(Resolvable::new(
            "feed",
            vec![],
            Arc::new(|_| {
                ResolveReturn::Stream(Box::pin(futures_util::stream::iter(vec![
                    Ok(Arc::new(1u32) as ResolvedValue),
                    Ok(Arc::new(2u32) as ResolvedValue),
                ])))
            }),
            Some(ResolvePolicy::lazy().rx_wait()),
        ));
        let value = r.resolve(DepValues::default()).await.unwrap();
        assert_eq!(*value.downcast_ref::<u32>().unwrap(), 1);
    }

    #[test]
    fn from_value_is_immediately_resolved() {
        let r = Resolvable::from_value("seed", Arc::new(7i64) as ResolvedValue);
        assert!(r.is_resolved());
        assert_eq!(*r.value().unwrap().downcast_ref::<i64>().unwrap(), 7);
    }

    #[test]
    fn dep_values_downcast() {
        let deps = DepValues::new(HashMap::from([(
            String::from("n"),
            Arc::new(5u8) as ResolvedValue,
        )]));
        let n: u8 = deps.get("n");
        assert_eq!(n, 5);
        assert!(deps.try_get::<String>("n").is_none());
        assert!(deps.try_get::<u8>("missing").is_none());
    }
}
