use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::types::{Encoded, ParamType};
use super::ParamTypes;

/// Where a parameter lives in the URL (or outside it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    /// A path segment (`/users/:id`).
    Path,
    /// A query parameter (`?from&to`).
    Search,
    /// Declared only in state config; never appears in the URL.
    Config,
}

/// Policy for collapsing a parameter equal to its default when formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquashPolicy {
    /// Always emit the value (`false` in declaration terms).
    Off,
    /// Omit the segment entirely (`true`).
    Omit,
    /// Replace the value with a literal placeholder token.
    Literal(String),
}

/// Multi-value mode for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMode {
    Off,
    On,
    /// Lists stay lists; a one-element list unwraps to its scalar.
    Auto,
}

/// Default value for an optional parameter: a constant or a provider
/// closure evaluated per lookup.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Provider(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn get(&self) -> Value {
        match self {
            DefaultValue::Static(v) => v.clone(),
            DefaultValue::Provider(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(v) => write!(f, "DefaultValue::Static({v})"),
            DefaultValue::Provider(_) => write!(f, "DefaultValue::Provider(..)"),
        }
    }
}

/// A parameter declaration as written on a state or URL pattern.
///
/// All fields are optional; unset fields fall back to type- and
/// location-derived defaults when the [`Param`] is built.
#[derive(Clone, Debug, Default)]
pub struct ParamDeclaration {
    pub default: Option<DefaultValue>,
    pub type_name: Option<String>,
    pub array: Option<ArrayMode>,
    pub squash: Option<SquashPolicy>,
    pub dynamic: Option<bool>,
    pub inherit: Option<bool>,
    pub raw: Option<bool>,
}

impl ParamDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a static default value (making the parameter optional).
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    /// Declare a default value provider.
    pub fn default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Provider(Arc::new(f)));
        self
    }

    pub fn typed(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn array(mut self, mode: ArrayMode) -> Self {
        self.array = Some(mode);
        self
    }

    pub fn squash(mut self, policy: SquashPolicy) -> Self {
        self.squash = Some(policy);
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = Some(inherit);
        self
    }

    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// A fully-built parameter: declaration merged with its type, location,
/// and the matcher-level defaults.
#[derive(Clone, Debug)]
pub struct Param {
    id: String,
    location: ParamLocation,
    scalar_type: ParamType,
    effective_type: ParamType,
    array: ArrayMode,
    squash: SquashPolicy,
    dynamic: bool,
    inherit: bool,
    raw: bool,
    default: Option<DefaultValue>,
}

impl Param {
    /// Build a parameter from its declaration.
    ///
    /// `default_squash` is the matcher-level squash policy applied to
    /// optional parameters that do not declare their own.
    pub fn from_declaration(
        id: impl Into<String>,
        location: ParamLocation,
        decl: &ParamDeclaration,
        types: &ParamTypes,
        default_squash: &SquashPolicy,
    ) -> Param {
        let mut id = id.into();
        // A trailing `[]` on the id declares array mode.
        let mut array = decl.array;
        if let Some(stripped) = id.strip_suffix("[]") {
            id = stripped.to_string();
            array.get_or_insert(ArrayMode::On);
        }
        let array = array.unwrap_or(match location {
            ParamLocation::Search => ArrayMode::Auto,
            _ => ArrayMode::Off,
        });

        let scalar_type = decl
            .type_name
            .as_deref()
            .and_then(|name| types.get(name))
            .unwrap_or_else(|| types.default_for(location));

        Param::from_parts(id, location, scalar_type, decl, array, default_squash)
    }

    /// Build a parameter whose type was already resolved (inline regex
    /// subpatterns and URL-grammar type references use this).
    pub fn from_parts(
        id: impl Into<String>,
        location: ParamLocation,
        scalar_type: ParamType,
        decl: &ParamDeclaration,
        array: ArrayMode,
        default_squash: &SquashPolicy,
    ) -> Param {
        let effective_type = match array {
            ArrayMode::Off => scalar_type.clone(),
            ArrayMode::On => scalar_type.wrap_array(false),
            ArrayMode::Auto => scalar_type.wrap_array(true),
        };
        let squash = match (&decl.default, &decl.squash) {
            (None, _) => SquashPolicy::Off,
            (Some(_), Some(policy)) => policy.clone(),
            (Some(_), None) => default_squash.clone(),
        };
        Param {
            id: id.into(),
            location,
            dynamic: decl.dynamic.unwrap_or_else(|| scalar_type.is_dynamic()),
            inherit: decl.inherit.unwrap_or_else(|| scalar_type.inherits()),
            raw: decl.raw.unwrap_or_else(|| scalar_type.is_raw()),
            default: decl.default.clone(),
            scalar_type,
            effective_type,
            array,
            squash,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> ParamLocation {
        self.location
    }

    pub fn array_mode(&self) -> ArrayMode {
        self.array
    }

    pub fn squash(&self) -> &SquashPolicy {
        &self.squash
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn inherits(&self) -> bool {
        self.inherit
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// The scalar type backing this parameter.
    pub fn scalar_type(&self) -> &ParamType {
        &self.scalar_type
    }

    /// The type used for values of this parameter (array-wrapped when the
    /// parameter is multi-valued).
    pub fn param_type(&self) -> &ParamType {
        &self.effective_type
    }

    /// Optional parameters carry a default value; search parameters are
    /// optional by nature (a missing query key never fails a match).
    pub fn is_optional(&self) -> bool {
        self.default.is_some() || self.location == ParamLocation::Search
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::get)
    }

    /// Substitute the default for a missing value.
    pub fn apply_default(&self, value: Option<Value>) -> Value {
        match value {
            Some(v) if !v.is_null() => v,
            _ => self.default_value().unwrap_or(Value::Null),
        }
    }

    pub fn is_default_value(&self, value: &Value) -> bool {
        match self.default_value() {
            Some(d) => self.effective_type.equals(value, &d),
            None => false,
        }
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        self.effective_type.equals(a, b)
    }

    /// Whether a value is acceptable for this parameter: `Null` is allowed
    /// only for optional parameters; anything else must pass the type
    /// predicate.
    pub fn validates(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.is_optional();
        }
        self.effective_type.is(value)
    }

    pub fn encode(&self, value: &Value) -> Encoded {
        self.effective_type.encode(value)
    }

    pub fn decode(&self, raw: &str) -> Value {
        self.effective_type.decode(raw)
    }
}

// ── Multi-value path segments ───────────────────────────────────────────────
//
// An array-mode path parameter occupies a single path segment: elements are
// joined with a literal `-`, and a `-` inside an element is escaped as `\-`.

pub fn join_array_segment(elements: &[String]) -> String {
    elements
        .iter()
        .map(|e| e.replace('\\', "\\\\").replace('-', "\\-"))
        .collect::<Vec<_>>()
        .join("-")
}

pub fn split_array_segment(segment: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '-' => {
                out.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    out.push(current);
    out
}
