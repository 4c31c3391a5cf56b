//! The transition pipeline: first-class transitions, the phased hook
//! lifecycle, and rejections.

mod hook;
mod options;
mod rejection;
mod runner;
mod service;
mod transition;

pub use hook::{
    CreateHookFn, HookMatchCriteria, HookRegOptions, HookResult, HookReturn, StateHookFn,
    StateMatch, TransitionHookFn, TransitionHookPhase,
};
pub use options::{LocationUpdate, ReloadOption, TransitionOptions, TransitionSource};
pub use rejection::{Rejection, RejectionKind};
pub use service::{HookHandle, TransitionService};
pub use transition::Transition;

pub(crate) use runner::run as run_transition;
