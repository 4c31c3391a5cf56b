use std::fmt;

/// Errors raised synchronously from registration and configuration calls.
///
/// These are thrown from the call site that caused them (`register`,
/// `decorator`, parameter-type registration, rule registration) and are
/// never wrapped into a transition [`Rejection`](crate::transition::Rejection).
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A state declaration carries an empty or malformed name.
    InvalidName(String),
    /// A state with this name is already registered or queued.
    DuplicateState(String),
    /// No registered state has this name.
    UnknownState(String),
    /// A relative state reference (`^`, `.child`) was used without a base,
    /// or walked above the root.
    UnresolvableBase { reference: String, base: String },
    /// A parameter type with this name is already registered.
    DuplicateParamType(String),
    /// A URL rule was rejected at registration.
    InvalidRule(String),
    /// A state's URL pattern failed to compile.
    Url(UrlError),
    /// The router has been disposed; registrations are no longer accepted.
    Disposed,
}

impl From<UrlError> for ConfigError {
    fn from(err: UrlError) -> Self {
        ConfigError::Url(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidName(name) => {
                write!(f, "Invalid state name '{name}': name must be a non-empty dotted identifier")
            }
            ConfigError::DuplicateState(name) => {
                write!(f, "State '{name}' is already defined")
            }
            ConfigError::UnknownState(name) => {
                write!(f, "No such state '{name}'")
            }
            ConfigError::UnresolvableBase { reference, base } => {
                write!(f, "Cannot resolve relative reference '{reference}' from base '{base}'")
            }
            ConfigError::DuplicateParamType(name) => {
                write!(f, "Parameter type '{name}' is already registered")
            }
            ConfigError::InvalidRule(msg) => write!(f, "Invalid URL rule: {msg}"),
            ConfigError::Url(err) => write!(f, "{err}"),
            ConfigError::Disposed => write!(f, "Router has been disposed"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised while compiling a URL pattern into a matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum UrlError {
    /// The pattern text could not be parsed.
    InvalidPattern { pattern: String, reason: String },
    /// An inline `{name:regexp}` subpattern has unbalanced parentheses.
    UnbalancedPattern { pattern: String },
    /// A `{name:typeName}` placeholder names a type that is not registered.
    UnknownParamType { pattern: String, type_name: String },
    /// The same parameter id appears twice in one matcher chain.
    DuplicateParam { pattern: String, param: String },
    /// Two matchers with incompatible case/strict flags were concatenated.
    IncompatibleAppend { reason: String },
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid URL pattern '{pattern}': {reason}")
            }
            UrlError::UnbalancedPattern { pattern } => {
                write!(f, "Unbalanced capture group in URL pattern '{pattern}'")
            }
            UrlError::UnknownParamType { pattern, type_name } => {
                write!(f, "Unknown parameter type '{type_name}' in URL pattern '{pattern}'")
            }
            UrlError::DuplicateParam { pattern, param } => {
                write!(f, "Duplicate parameter '{param}' in URL pattern '{pattern}'")
            }
            UrlError::IncompatibleAppend { reason } => {
                write!(f, "Cannot concatenate URL matchers: {reason}")
            }
        }
    }
}

impl std::error::Error for UrlError {}
