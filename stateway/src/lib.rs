//! # stateway
//!
//! A framework-agnostic client-side routing engine: hierarchical
//! application states mapped to URLs, asynchronous transitions with a
//! phased hook lifecycle, typed URL parameters, and a per-state resolve
//! graph. This crate re-exports the [`stateway_core`] surface; hosts that
//! want to cherry-pick subsystems can depend on the core crate directly.
//!
//! ```no_run
//! use stateway::prelude::*;
//! use std::collections::HashMap;
//!
//! # async fn demo() {
//! let (router, _location) = Router::with_memory_location();
//!
//! router
//!     .state_registry()
//!     .register(StateDeclaration::named("app").url("/app"))
//!     .unwrap();
//! router
//!     .state_registry()
//!     .register(StateDeclaration::named("app.user").url("/users/:id"))
//!     .unwrap();
//!
//! let user = router
//!     .state_service()
//!     .go(
//!         "app.user",
//!         HashMap::from([(String::from("id"), serde_json::json!("42"))]),
//!         TransitionOptions::new(),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(user.name(), "app.user");
//! # }
//! ```

pub use stateway_core::*;

pub mod prelude {
    pub use stateway_core::prelude::*;
}
