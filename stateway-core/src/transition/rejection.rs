use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The five ways a transition fails to reach its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectionKind {
    /// Another transition started, or a hook redirected this one.
    Superseded,
    /// A hook returned `false`, or `abort()` was called.
    Aborted,
    /// The target state or parameters failed validation.
    Invalid,
    /// The target equals the current state with no meaningful change.
    Ignored,
    /// A hook or resolvable raised an error.
    Error,
}

/// A transition rejection: a first-class value, never a panic.
///
/// Rejections surface through the transition's promise, matching
/// `onError` hooks, and (for `Error`/`Invalid` kinds) the default error
/// handler. Serializable so hosts can log them structurally.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    pub detail: Option<Value>,
    /// True when this rejection superseded the transition in favor of a
    /// redirect target.
    pub redirected: bool,
}

impl Rejection {
    pub fn superseded(detail: Option<Value>) -> Rejection {
        Rejection {
            kind: RejectionKind::Superseded,
            message: "The transition has been superseded by a different transition".into(),
            detail,
            redirected: false,
        }
    }

    pub fn redirected(detail: Option<Value>) -> Rejection {
        Rejection {
            redirected: true,
            ..Rejection::superseded(detail)
        }
    }

    pub fn aborted(detail: Option<Value>) -> Rejection {
        Rejection {
            kind: RejectionKind::Aborted,
            message: "The transition has been aborted".into(),
            detail,
            redirected: false,
        }
    }

    pub fn invalid(detail: impl Into<Value>) -> Rejection {
        Rejection {
            kind: RejectionKind::Invalid,
            message: "This transition is invalid".into(),
            detail: Some(detail.into()),
            redirected: false,
        }
    }

    pub fn ignored(detail: Option<Value>) -> Rejection {
        Rejection {
            kind: RejectionKind::Ignored,
            message: "The transition was ignored".into(),
            detail,
            redirected: false,
        }
    }

    pub fn error(detail: impl Into<Value>) -> Rejection {
        Rejection {
            kind: RejectionKind::Error,
            message: "The transition errored".into(),
            detail: Some(detail.into()),
            redirected: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Rejection {
        self.message = message.into();
        self
    }

    /// Whether this rejection is reported to the default error handler
    /// (`Superseded`/`Aborted`/`Ignored` are normal control flow).
    pub fn reaches_default_handler(&self) -> bool {
        matches!(self.kind, RejectionKind::Error | RejectionKind::Invalid)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejection {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handler_filter() {
        assert!(Rejection::error("x").reaches_default_handler());
        assert!(Rejection::invalid("x").reaches_default_handler());
        assert!(!Rejection::superseded(None).reaches_default_handler());
        assert!(!Rejection::aborted(None).reaches_default_handler());
        assert!(!Rejection::ignored(None).reaches_default_handler());
    }

    #[test]
    fn redirected_flag() {
        let r = Rejection::redirected(None);
        assert_eq!(r.kind, RejectionKind::Superseded);
        assert!(r.redirected);
    }
}
