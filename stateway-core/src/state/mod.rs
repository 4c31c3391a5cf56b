//! The hierarchical state model: declarations, built state nodes, the
//! builder chain, the registry, and navigation targets.

mod builder;
mod declaration;
mod matcher;
mod object;
mod registry;
mod service;
mod target;

pub use builder::{DecoratorFn, StateBuilder, StateBuilding, DECORATABLE_PROPERTIES};
pub use declaration::{LazyLoadFn, LazyLoadResult, RedirectTarget, RedirectTo, StateDeclaration};
pub use matcher::{resolve_relative, Glob, StateMatcher};
pub use object::{StateObject, StateRef};
pub use registry::{
    StateRegistry, StateRegistryEvent, StatesChangedFn, StatesChangedHandle,
};
pub use service::StateService;
pub use target::TargetState;
