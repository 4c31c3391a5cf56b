//! Per-category trace switches.
//!
//! Routed through `tracing` at info level when the category is enabled;
//! the structured `debug!` events elsewhere in the crate are unaffected.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceCategory {
    Transition,
    Hook,
    Resolve,
    Url,
}

#[derive(Default)]
pub struct Trace {
    transition: AtomicBool,
    hook: AtomicBool,
    resolve: AtomicBool,
    url: AtomicBool,
}

impl Trace {
    pub fn new() -> Trace {
        Trace::default()
    }

    fn slot(&self, category: TraceCategory) -> &AtomicBool {
        match category {
            TraceCategory::Transition => &self.transition,
            TraceCategory::Hook => &self.hook,
            TraceCategory::Resolve => &self.resolve,
            TraceCategory::Url => &self.url,
        }
    }

    pub fn enable(&self, category: TraceCategory) {
        self.slot(category).store(true, Ordering::SeqCst);
    }

    pub fn disable(&self, category: TraceCategory) {
        self.slot(category).store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self, category: TraceCategory) -> bool {
        self.slot(category).load(Ordering::SeqCst)
    }

    /// Emit a narrative line when the category is on. The message is built
    /// lazily.
    pub fn log(&self, category: TraceCategory, message: impl FnOnce() -> String) {
        if self.is_enabled(category) {
            info!(category = ?category, "{}", message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_toggle_independently() {
        let trace = Trace::new();
        assert!(!trace.is_enabled(TraceCategory::Transition));
        trace.enable(TraceCategory::Transition);
        assert!(trace.is_enabled(TraceCategory::Transition));
        assert!(!trace.is_enabled(TraceCategory::Url));
        trace.disable(TraceCategory::Transition);
        assert!(!trace.is_enabled(TraceCategory::Transition));
    }
}
