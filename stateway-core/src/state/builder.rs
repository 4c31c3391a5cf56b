//! The state builder: completes a declaration into a [`StateObject`].
//!
//! Building runs a fixed chain of per-property steps (`parent` is supplied
//! by the registry; then `includes`, `params`, `url`, `data`,
//! `resolvables`). After each core step, decorator callbacks registered
//! for that property run against the in-progress build, seeing the core
//! result and free to replace it.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::param::{Param, ParamLocation};
use crate::resolve::Resolvable;
use crate::url::{UrlMatcher, UrlMatcherFactory};

use super::declaration::StateDeclaration;
use super::object::{StateObject, StateRef};

/// The mutable in-progress build handed to decorators.
pub struct StateBuilding {
    pub declaration: StateDeclaration,
    pub name: String,
    pub parent: Option<StateRef>,
    /// Full matcher from the root, set when this state declares a url.
    pub url: Option<UrlMatcher>,
    pub own_url: bool,
    pub params: HashMap<String, Param>,
    pub includes: HashSet<String>,
    pub data: serde_json::Map<String, Value>,
    pub resolvables: Vec<Arc<Resolvable>>,
}

/// Decorator callback for one property.
pub type DecoratorFn = Arc<dyn Fn(&mut StateBuilding) + Send + Sync>;

/// Property names decorators may attach to.
pub const DECORATABLE_PROPERTIES: &[&str] =
    &["includes", "params", "url", "data", "views", "resolvables"];

#[derive(Default)]
pub struct StateBuilder {
    decorators: HashMap<String, Vec<DecoratorFn>>,
}

impl StateBuilder {
    pub fn new() -> StateBuilder {
        StateBuilder::default()
    }

    /// Append a decorator for `property`, running after the core builder
    /// for that property (and after previously registered decorators).
    pub fn decorator(&mut self, property: impl Into<String>, f: DecoratorFn) {
        self.decorators.entry(property.into()).or_default().push(f);
    }

    fn run_decorators(&self, property: &str, building: &mut StateBuilding) {
        if let Some(fns) = self.decorators.get(property) {
            for f in fns {
                f(building);
            }
        }
    }

    /// Build a state under an already-registered parent.
    pub(crate) fn build(
        &self,
        declaration: StateDeclaration,
        parent: Option<StateRef>,
        factory: &UrlMatcherFactory,
    ) -> Result<StateObject, ConfigError> {
        let name = declaration.name.clone();
        let mut building = StateBuilding {
            name: name.clone(),
            parent,
            url: None,
            own_url: false,
            params: HashMap::new(),
            includes: HashSet::new(),
            data: serde_json::Map::new(),
            resolvables: Vec::new(),
            declaration,
        };

        // includes: self plus every ancestor name
        building.includes = building
            .parent
            .as_ref()
            .map(|p| p.includes_set().clone())
            .unwrap_or_default();
        building.includes.insert(name.clone());
        self.run_decorators("includes", &mut building);

        // url + params: compile the state's own fragment, then append it
        // to the nearest navigable ancestor's full matcher
        if let Some(pattern) = building.declaration.url.clone() {
            let own = factory.compile(&pattern, &building.declaration.params)?;
            for param in own.parameters() {
                building.params.insert(param.id().to_string(), param.clone());
            }
            let base = building
                .parent
                .as_ref()
                .and_then(|p| p.navigable())
                .and_then(|nav| nav.url().cloned())
                .unwrap_or_else(|| factory.root_matcher());
            building.url = Some(base.append(&own)?);
            building.own_url = true;
        }
        // config-only params: declared but not part of the url
        let config = factory.config();
        for (id, decl) in &building.declaration.params {
            if !building.params.contains_key(id.trim_end_matches("[]")) {
                let param = Param::from_declaration(
                    id.clone(),
                    ParamLocation::Config,
                    decl,
                    factory.param_types(),
                    &config.default_squash,
                );
                building.params.insert(param.id().to_string(), param);
            }
        }
        self.run_decorators("url", &mut building);
        self.run_decorators("params", &mut building);

        // data: ancestor maps merged with child keys overriding
        building.data = building
            .parent
            .as_ref()
            .map(|p| p.data().clone())
            .unwrap_or_default();
        for (k, v) in &building.declaration.data {
            building.data.insert(k.clone(), v.clone());
        }
        self.run_decorators("data", &mut building);

        self.run_decorators("views", &mut building);

        // resolvables: fresh instances per registration
        building.resolvables = building
            .declaration
            .resolve
            .iter()
            .map(|decl| decl.build(&name))
            .collect();
        self.run_decorators("resolvables", &mut building);

        let StateBuilding {
            declaration,
            name,
            parent,
            url,
            own_url,
            params,
            includes,
            data,
            resolvables,
        } = building;

        Ok(StateObject::new(
            name,
            parent,
            declaration,
            url,
            own_url,
            params,
            includes,
            data,
            resolvables,
        ))
    }

    /// Build the implicit root: empty name, abstract, synthetic matcher
    /// owning the `#` parameter.
    pub(crate) fn build_root(factory: &UrlMatcherFactory) -> StateObject {
        let declaration = StateDeclaration {
            is_abstract: true,
            ..StateDeclaration::named("")
        };
        let root_matcher = factory.root_matcher();
        let mut params = HashMap::new();
        if let Some(hash) = root_matcher.parameter("#") {
            params.insert(hash.id().to_string(), hash.clone());
        }
        StateObject::new(
            String::new(),
            None,
            declaration,
            Some(root_matcher),
            true,
            params,
            HashSet::from([String::new()]),
            serde_json::Map::new(),
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamDeclaration;
    use serde_json::json;

    fn factory() -> UrlMatcherFactory {
        UrlMatcherFactory::default()
    }

    fn root(factory: &UrlMatcherFactory) -> StateRef {
        Arc::new(StateBuilder::build_root(factory))
    }

    #[test]
    fn url_appends_to_parent_matcher() {
        let f = factory();
        let builder = StateBuilder::new();
        let root = root(&f);
        let a = Arc::new(
            builder
                .build(StateDeclaration::named("a").url("/a"), Some(root), &f)
                .unwrap(),
        );
        let b = builder
            .build(StateDeclaration::named("a.b").url("/b/:id"), Some(a), &f)
            .unwrap();
        let url = b.url().unwrap();
        let params = url.exec("/a/b/7", &HashMap::new(), "").unwrap();
        assert_eq!(params["id"], json!("7"));
    }

    #[test]
    fn url_skips_non_navigable_parent() {
        let f = factory();
        let builder = StateBuilder::new();
        let root = root(&f);
        let a = Arc::new(
            builder
                .build(StateDeclaration::named("a").url("/a"), Some(root), &f)
                .unwrap(),
        );
        // b has no url; c's matcher must append to a's
        let b = Arc::new(
            builder
                .build(StateDeclaration::named("a.b"), Some(a), &f)
                .unwrap(),
        );
        let c = builder
            .build(StateDeclaration::named("a.b.c").url("/c"), Some(b), &f)
            .unwrap();
        assert!(c.url().unwrap().exec("/a/c", &HashMap::new(), "").is_some());
    }

    #[test]
    fn config_only_params_are_built() {
        let f = factory();
        let builder = StateBuilder::new();
        let root = root(&f);
        let s = builder
            .build(
                StateDeclaration::named("s")
                    .url("/s/:id")
                    .param("hidden", ParamDeclaration::new().default_value(1).typed("int")),
                Some(root),
                &f,
            )
            .unwrap();
        assert_eq!(s.own_params().len(), 2);
        let hidden = &s.own_params()["hidden"];
        assert_eq!(hidden.location(), ParamLocation::Config);
        assert!(hidden.is_optional());
    }

    #[test]
    fn data_inherits_down_the_tree() {
        let f = factory();
        let builder = StateBuilder::new();
        let root = root(&f);
        let a = Arc::new(
            builder
                .build(
                    StateDeclaration::named("a")
                        .data("theme", json!("dark"))
                        .data("lang", json!("en")),
                    Some(root),
                    &f,
                )
                .unwrap(),
        );
        let b = builder
            .build(
                StateDeclaration::named("a.b").data("lang", json!("fr")),
                Some(a),
                &f,
            )
            .unwrap();
        assert_eq!(b.data()["theme"], json!("dark"));
        assert_eq!(b.data()["lang"], json!("fr"));
    }

    #[test]
    fn decorators_see_and_replace_core_result() {
        let f = factory();
        let mut builder = StateBuilder::new();
        builder.decorator(
            "data",
            Arc::new(|building: &mut StateBuilding| {
                let prev = building.data.get("n").and_then(Value::as_i64).unwrap_or(0);
                building.data.insert("n".into(), json!(prev + 1));
            }),
        );
        builder.decorator(
            "data",
            Arc::new(|building: &mut StateBuilding| {
                let prev = building.data.get("n").and_then(Value::as_i64).unwrap_or(0);
                building.data.insert("n".into(), json!(prev * 10));
            }),
        );
        let root = root(&f);
        let s = builder
            .build(StateDeclaration::named("s").data("n", json!(4)), Some(root), &f)
            .unwrap();
        // core merge (4), then +1, then *10: decorators chain in order
        assert_eq!(s.data()["n"], json!(50));
    }
}
