use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::UrlError;
use crate::param::{ParamDeclaration, ParamType, ParamTypes, SquashPolicy};

use super::matcher::{MatcherConfig, UrlMatcher};

/// Factory for URL matchers, carrying the parameter-type registry and the
/// matcher flags (`caseInsensitive`, `strictMode`, `defaultSquashPolicy`).
///
/// Flag changes affect matchers compiled afterwards; states register their
/// URLs at declaration time, so hosts configure flags first.
pub struct UrlMatcherFactory {
    types: Arc<ParamTypes>,
    config: RwLock<MatcherConfig>,
}

impl Default for UrlMatcherFactory {
    fn default() -> Self {
        UrlMatcherFactory::new(Arc::new(ParamTypes::new()))
    }
}

impl UrlMatcherFactory {
    pub fn new(types: Arc<ParamTypes>) -> Self {
        UrlMatcherFactory {
            types,
            config: RwLock::new(MatcherConfig::default()),
        }
    }

    pub fn param_types(&self) -> &Arc<ParamTypes> {
        &self.types
    }

    pub fn case_insensitive(&self, value: bool) {
        self.config.write().expect("matcher config lock").case_insensitive = value;
    }

    pub fn strict_mode(&self, value: bool) {
        self.config.write().expect("matcher config lock").strict_mode = value;
    }

    pub fn default_squash_policy(&self, policy: SquashPolicy) {
        self.config.write().expect("matcher config lock").default_squash = policy;
    }

    pub fn config(&self) -> MatcherConfig {
        self.config.read().expect("matcher config lock").clone()
    }

    /// Compile a pattern with per-parameter declaration overrides.
    pub fn compile(
        &self,
        pattern: &str,
        param_decls: &HashMap<String, ParamDeclaration>,
    ) -> Result<UrlMatcher, UrlError> {
        UrlMatcher::compile(pattern, &self.types, &self.config(), param_decls)
    }

    /// The synthetic root matcher (owns the `#` parameter).
    pub fn root_matcher(&self) -> UrlMatcher {
        UrlMatcher::root(&self.types, &self.config())
    }

    /// Register a custom parameter type.
    pub fn register_type(&self, ty: ParamType) -> Result<(), crate::error::ConfigError> {
        self.types.register(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_apply_to_later_compiles() {
        let factory = UrlMatcherFactory::default();
        factory.strict_mode(false);
        let m = factory.compile("/x", &HashMap::new()).unwrap();
        assert!(m.exec("/x/", &HashMap::new(), "").is_some());
    }

    #[test]
    fn default_squash_inherited_by_optional_params() {
        let factory = UrlMatcherFactory::default();
        factory.default_squash_policy(SquashPolicy::Omit);
        let decls = HashMap::from([(
            String::from("id"),
            ParamDeclaration::new().default_value("d"),
        )]);
        let m = factory.compile("/p/:id", &decls).unwrap();
        let url = m
            .format(&HashMap::from([(String::from("id"), serde_json::json!("d"))]))
            .unwrap();
        assert_eq!(url, "/p");
    }
}
