use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A parameter value encoded for the URL: either a single string or, for
/// multi-valued parameters, one string per element.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    One(String),
    Many(Vec<String>),
}

impl Encoded {
    /// Flatten to a single string (multi-values joined with `,`: only used
    /// for diagnostics, never for URL output).
    pub fn into_single(self) -> String {
        match self {
            Encoded::One(s) => s,
            Encoded::Many(v) => v.join(","),
        }
    }

    pub fn as_slice(&self) -> Vec<&str> {
        match self {
            Encoded::One(s) => vec![s.as_str()],
            Encoded::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Behavioral contract of a parameter type.
///
/// A type knows how to recognize its values (`is`), move them between the
/// URL string domain and the [`Value`] domain (`encode`/`decode`), and
/// compare them (`equals`). Implementations are registered on
/// [`ParamTypes`](crate::param::ParamTypes) and referenced by name from URL
/// patterns (`{id:int}`) and state parameter declarations.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a parameter type",
    label = "this type cannot back a URL parameter",
    note = "implement `ParamTypeDef` and register it with `ParamTypes::register`"
)]
pub trait ParamTypeDef: Send + Sync {
    /// Type predicate: does this value belong to the type?
    fn is(&self, value: &Value) -> bool;

    /// Encode a value for URL output. Called with values that passed `is`.
    fn encode(&self, value: &Value) -> Encoded;

    /// Decode one raw URL fragment. A value that cannot be decoded should
    /// come back as `Value::Null` so the subsequent `is` check fails the
    /// match instead of panicking.
    fn decode(&self, raw: &str) -> Value;

    /// Value equality under this type. Defaults to structural equality.
    fn equals(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// A named, pattern-carrying handle to a [`ParamTypeDef`].
///
/// `ParamType` is what the URL matcher and `Param` declarations actually
/// hold: the behavioral trait object plus the regex fragment used when the
/// type appears in a path segment, and the type-level defaults for the
/// `raw`/`dynamic`/`inherit` flags.
#[derive(Clone)]
pub struct ParamType {
    name: String,
    pattern: String,
    regex: Arc<Regex>,
    raw: bool,
    dynamic: bool,
    inherit: bool,
    def: Arc<dyn ParamTypeDef>,
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl ParamType {
    /// Create a type from a name, a regex fragment (no anchors), and a
    /// behavioral definition.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex fragment. Built-in patterns
    /// are static; custom types are registered at configuration time where
    /// a panic is the synchronous failure mode for malformed input.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, def: Arc<dyn ParamTypeDef>) -> Self {
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .unwrap_or_else(|e| panic!("invalid parameter type pattern '{pattern}': {e}"));
        ParamType {
            name: name.into(),
            pattern,
            regex: Arc::new(regex),
            raw: false,
            dynamic: false,
            inherit: true,
            def,
        }
    }

    /// Mark values of this type as exempt from percent-encoding.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Mark parameters of this type as dynamic by default.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Control whether parameters of this type participate in param
    /// inheritance on navigation (default: they do).
    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Regex fragment used when this type appears as a path segment.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn inherits(&self) -> bool {
        self.inherit
    }

    pub fn is(&self, value: &Value) -> bool {
        self.def.is(value)
    }

    pub fn encode(&self, value: &Value) -> Encoded {
        self.def.encode(value)
    }

    pub fn decode(&self, raw: &str) -> Value {
        self.def.decode(raw)
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        self.def.equals(a, b)
    }

    /// Whether an already-encoded string matches this type's pattern.
    pub fn pattern_matches(&self, encoded: &str) -> bool {
        self.regex.is_match(encoded)
    }

    /// Derive a type with the same behavior but a different path-segment
    /// pattern (inline `{name:[0-9]+}` subpatterns use this).
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex fragment; callers validate
    /// the fragment first.
    pub fn with_pattern(&self, pattern: impl Into<String>) -> ParamType {
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .unwrap_or_else(|e| panic!("invalid parameter pattern '{pattern}': {e}"));
        ParamType {
            name: self.name.clone(),
            pattern,
            regex: Arc::new(regex),
            raw: self.raw,
            dynamic: self.dynamic,
            inherit: self.inherit,
            def: self.def.clone(),
        }
    }

    /// Lift this scalar type to a multi-valued type.
    ///
    /// The wrapped type recognizes arrays whose elements all pass the inner
    /// `is`, encodes element-wise, and compares arrays pairwise. With
    /// `auto`, a one-element array is treated interchangeably with its
    /// scalar on `is`/`equals`.
    pub fn wrap_array(&self, auto: bool) -> ParamType {
        ParamType {
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            regex: self.regex.clone(),
            raw: self.raw,
            dynamic: self.dynamic,
            inherit: self.inherit,
            def: Arc::new(ArrayTypeDef {
                inner: self.def.clone(),
                auto,
            }),
        }
    }
}

/// Adapter making any scalar [`ParamTypeDef`] multi-valued.
struct ArrayTypeDef {
    inner: Arc<dyn ParamTypeDef>,
    auto: bool,
}

impl ArrayTypeDef {
    fn unwrap_auto<'v>(&self, value: &'v Value) -> &'v Value {
        if self.auto {
            if let Value::Array(items) = value {
                if items.len() == 1 {
                    return &items[0];
                }
            }
        }
        value
    }
}

impl ParamTypeDef for ArrayTypeDef {
    fn is(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().all(|v| self.inner.is(v)),
            other => self.auto && self.inner.is(other),
        }
    }

    fn encode(&self, value: &Value) -> Encoded {
        match value {
            Value::Array(items) => Encoded::Many(
                items
                    .iter()
                    .map(|v| self.inner.encode(v).into_single())
                    .collect(),
            ),
            other => Encoded::Many(vec![self.inner.encode(other).into_single()]),
        }
    }

    fn decode(&self, raw: &str) -> Value {
        Value::Array(vec![self.inner.decode(raw)])
    }

    fn equals(&self, a: &Value, b: &Value) -> bool {
        let (a, b) = (self.unwrap_auto(a), self.unwrap_auto(b));
        match (a, b) {
            (Value::Array(xs), Value::Array(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys.iter()).all(|(x, y)| self.inner.equals(x, y))
            }
            (x, y) => self.inner.equals(x, y),
        }
    }
}
