//! # stateway-core
//!
//! The core of a framework-agnostic client-side routing engine: a
//! hierarchical state registry, a typed URL matcher with a prioritized
//! rule engine, and an asynchronous transition pipeline with a phased
//! hook lifecycle and a per-state resolve graph.
//!
//! The crate is a library of collaborating services assembled by
//! [`Router`]:
//!
//! - **[`param`]** - pluggable typed URL parameters
//! - **[`url`]** - pattern matching, the rule engine, and URL syncing
//! - **[`state`]** - state declarations, the builder, registry, and the
//!   navigation façade
//! - **[`resolve`]** - per-state async dependencies with eagerness and
//!   wait policies
//! - **[`path`]** - path snapshots and the kept/entering/exiting
//!   partition
//! - **[`transition`]** - the transition value, hooks, and the phase
//!   runner
//! - **[`location`]** - the consumed location traits plus in-memory,
//!   hash, and pushState reference implementations
//! - **[`view`]** - the abstract ui-view registry
//!
//! View rendering, DOM access, and dependency injection stay outside: the
//! engine talks to them through the [`location::LocationServices`],
//! [`location::LocationConfig`], and [`injector::Injector`] traits.
//!
//! ## Quick start
//!
//! ```no_run
//! use stateway_core::prelude::*;
//! use std::collections::HashMap;
//!
//! # async fn demo() {
//! let (router, _location) = Router::with_memory_location();
//!
//! router
//!     .state_registry()
//!     .register(StateDeclaration::named("inbox").url("/inbox"))
//!     .unwrap();
//!
//! let state = router
//!     .state_service()
//!     .go("inbox", HashMap::new(), TransitionOptions::new())
//!     .await
//!     .unwrap();
//! assert_eq!(state.name(), "inbox");
//! # }
//! ```

pub mod error;
pub mod globals;
pub mod injector;
pub mod location;
pub mod param;
pub mod path;
pub mod plugin;
pub mod resolve;
pub mod router;
pub mod state;
pub mod trace;
pub mod transition;
pub mod url;
pub mod view;

pub use error::{ConfigError, UrlError};
pub use globals::{BoundedQueue, RouterGlobals};
pub use injector::Injector;
pub use plugin::RouterPlugin;
pub use router::Router;
pub use trace::{Trace, TraceCategory};

/// The types most hosts need, in one import.
pub mod prelude {
    pub use crate::error::{ConfigError, UrlError};
    pub use crate::injector::Injector;
    pub use crate::location::{
        BrowserPort, HashLocation, LocationConfig, LocationServices, MemoryLocation,
        PushStateLocation,
    };
    pub use crate::param::{ArrayMode, ParamDeclaration, ParamType, ParamTypeDef, SquashPolicy};
    pub use crate::plugin::RouterPlugin;
    pub use crate::resolve::{
        DepValues, ResolvableDecl, ResolvePolicy, ResolveReturn, ResolveWait, ResolveWhen,
    };
    pub use crate::router::Router;
    pub use crate::state::{
        LazyLoadResult, RedirectTarget, RedirectTo, StateDeclaration, StateRef, TargetState,
    };
    pub use crate::transition::{
        HookMatchCriteria, HookRegOptions, HookResult, HookReturn, LocationUpdate, Rejection,
        RejectionKind, ReloadOption, StateMatch, Transition, TransitionHookPhase,
        TransitionOptions, TransitionSource,
    };
    pub use crate::url::{UrlParts, UrlRule, UrlRuleHandler};
}
