//! Typed URL parameters.
//!
//! A parameter couples an id with a [`ParamType`] (recognize / encode /
//! decode / compare), a location (path, search, or config-only), and
//! per-declaration flags: default value, squash policy, dynamic, inherit,
//! array mode, raw. Types are pluggable through the [`ParamTypes`]
//! registry; URL patterns reference them by name.

mod builtins;
mod param;
mod types;

pub use builtins::ParamTypes;
pub use param::{
    join_array_segment, split_array_segment, ArrayMode, DefaultValue, Param, ParamDeclaration,
    ParamLocation, SquashPolicy,
};
pub use types::{Encoded, ParamType, ParamTypeDef};
