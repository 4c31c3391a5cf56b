//! Built-in parameter types and the type registry.
//!
//! The built-ins mirror the conventional set a routing engine needs:
//! `string`, `int`, `bool`, `date`, `json`, `any`, plus the three
//! location-default types `path`, `query`, and `hash`.

use chrono::NaiveDate;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ConfigError;

use super::types::{Encoded, ParamType, ParamTypeDef};

// ── Built-in definitions ────────────────────────────────────────────────────

/// Plain string values. Also backs `path` (segment-shaped pattern) and
/// `query` (query-shaped pattern).
struct StringDef;

impl ParamTypeDef for StringDef {
    fn is(&self, value: &Value) -> bool {
        value.is_string()
    }
    fn encode(&self, value: &Value) -> Encoded {
        Encoded::One(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
    fn decode(&self, raw: &str) -> Value {
        Value::String(raw.to_string())
    }
}

struct IntDef;

impl ParamTypeDef for IntDef {
    fn is(&self, value: &Value) -> bool {
        value.as_i64().is_some()
    }
    fn encode(&self, value: &Value) -> Encoded {
        Encoded::One(value.as_i64().map(|n| n.to_string()).unwrap_or_default())
    }
    fn decode(&self, raw: &str) -> Value {
        raw.parse::<i64>().map(Value::from).unwrap_or(Value::Null)
    }
}

struct BoolDef;

impl ParamTypeDef for BoolDef {
    fn is(&self, value: &Value) -> bool {
        value.is_boolean()
    }
    fn encode(&self, value: &Value) -> Encoded {
        Encoded::One(if value.as_bool().unwrap_or(false) { "1" } else { "0" }.to_string())
    }
    fn decode(&self, raw: &str) -> Value {
        match raw {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            _ => Value::Null,
        }
    }
}

/// Calendar dates, carried as ISO `YYYY-MM-DD` strings and compared as
/// dates (so `2014-01-01` written two different ways still compares equal).
struct DateDef;

impl DateDef {
    fn parse(value: &Value) -> Option<NaiveDate> {
        value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }
}

impl ParamTypeDef for DateDef {
    fn is(&self, value: &Value) -> bool {
        Self::parse(value).is_some()
    }
    fn encode(&self, value: &Value) -> Encoded {
        Encoded::One(
            Self::parse(value)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        )
    }
    fn decode(&self, raw: &str) -> Value {
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Err(_) => Value::Null,
        }
    }
    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (Self::parse(a), Self::parse(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        }
    }
}

/// Arbitrary JSON values, serialized into a single URL token.
struct JsonDef;

impl ParamTypeDef for JsonDef {
    fn is(&self, _value: &Value) -> bool {
        true
    }
    fn encode(&self, value: &Value) -> Encoded {
        Encoded::One(value.to_string())
    }
    fn decode(&self, raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or(Value::Null)
    }
}

/// Non-URL values passed between states (`location: Config`). Structural
/// equality, identity encode.
struct AnyDef;

impl ParamTypeDef for AnyDef {
    fn is(&self, _value: &Value) -> bool {
        true
    }
    fn encode(&self, value: &Value) -> Encoded {
        Encoded::One(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
    fn decode(&self, raw: &str) -> Value {
        Value::String(raw.to_string())
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

const DATE_PATTERN: &str = r"[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[1-2][0-9]|3[0-1])";

/// Registry of parameter types, seeded with the built-ins.
///
/// Host frameworks register custom types before declaring states; a URL
/// pattern then references them by name (`{id:myType}`). Duplicate names
/// fail with [`ConfigError::DuplicateParamType`].
pub struct ParamTypes {
    types: DashMap<String, ParamType>,
}

impl Default for ParamTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamTypes {
    pub fn new() -> Self {
        let registry = ParamTypes {
            types: DashMap::new(),
        };
        let builtins = [
            ParamType::new("string", "[^/]*", Arc::new(StringDef)),
            ParamType::new("int", "-?\\d+", Arc::new(IntDef)),
            ParamType::new("bool", "0|1", Arc::new(BoolDef)),
            ParamType::new("date", DATE_PATTERN, Arc::new(DateDef)),
            ParamType::new("json", "[^/]*", Arc::new(JsonDef)),
            ParamType::new("any", ".*", Arc::new(AnyDef)).raw(),
            // Location defaults: `path` for path segments, `query` for
            // search params, `hash` for the '#' fragment.
            ParamType::new("path", "[^/]*", Arc::new(StringDef)),
            ParamType::new("query", "[^&?]*", Arc::new(StringDef)),
            ParamType::new("hash", "[^&?]*", Arc::new(StringDef)).raw().dynamic(),
        ];
        for ty in builtins {
            registry.types.insert(ty.name().to_string(), ty);
        }
        registry
    }

    /// Register a custom parameter type. Fails on name collision, including
    /// collisions with built-ins.
    pub fn register(&self, ty: ParamType) -> Result<(), ConfigError> {
        if self.types.contains_key(ty.name()) {
            return Err(ConfigError::DuplicateParamType(ty.name().to_string()));
        }
        self.types.insert(ty.name().to_string(), ty);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ParamType> {
        self.types.get(name).map(|t| t.clone())
    }

    /// The default type for a parameter at the given location.
    pub fn default_for(&self, location: super::ParamLocation) -> ParamType {
        let name = match location {
            super::ParamLocation::Path => "path",
            super::ParamLocation::Search => "query",
            super::ParamLocation::Config => "any",
        };
        self.get(name).expect("built-in parameter types are always registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_decode_and_validate() {
        let types = ParamTypes::new();
        let int = types.get("int").unwrap();
        assert_eq!(int.decode("42"), json!(42));
        assert_eq!(int.decode("-7"), json!(-7));
        assert_eq!(int.decode("4x2"), Value::Null);
        assert!(int.is(&json!(42)));
        assert!(!int.is(&json!("42")));
    }

    #[test]
    fn bool_encodes_as_bit() {
        let types = ParamTypes::new();
        let b = types.get("bool").unwrap();
        assert_eq!(b.encode(&json!(true)), Encoded::One("1".into()));
        assert_eq!(b.decode("0"), json!(false));
        assert_eq!(b.decode("yes"), Value::Null);
    }

    #[test]
    fn date_equality_is_calendar_equality() {
        let types = ParamTypes::new();
        let d = types.get("date").unwrap();
        assert!(d.is(&json!("2014-11-15")));
        assert!(!d.is(&json!("2014-13-01")));
        assert!(d.equals(&json!("2014-11-15"), &json!("2014-11-15")));
        assert!(d.pattern_matches("2014-11-15"));
        assert!(!d.pattern_matches("14-11-15"));
    }

    #[test]
    fn json_roundtrip() {
        let types = ParamTypes::new();
        let j = types.get("json").unwrap();
        let v = json!({"a": [1, 2]});
        let enc = j.encode(&v).into_single();
        assert_eq!(j.decode(&enc), v);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let types = ParamTypes::new();
        let dup = ParamType::new("int", "\\d+", Arc::new(StringDef));
        assert!(matches!(
            types.register(dup),
            Err(ConfigError::DuplicateParamType(name)) if name == "int"
        ));
    }
}
