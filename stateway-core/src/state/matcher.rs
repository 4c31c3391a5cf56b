//! State name lookup: exact, relative (`^`, `.child`), and glob matching.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::ConfigError;

use super::object::StateRef;

/// A dot-separated glob over state names: `*` matches exactly one segment,
/// `**` matches zero or more.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    segments: Vec<GlobSegment>,
}

#[derive(Debug, Clone, PartialEq)]
enum GlobSegment {
    Literal(String),
    One,
    Many,
}

impl Glob {
    pub fn new(pattern: impl Into<String>) -> Glob {
        let pattern = pattern.into();
        let segments = pattern
            .split('.')
            .map(|s| match s {
                "*" => GlobSegment::One,
                "**" => GlobSegment::Many,
                lit => GlobSegment::Literal(lit.to_string()),
            })
            .collect();
        Glob { pattern, segments }
    }

    /// Does the pattern contain glob wildcards at all?
    pub fn is_glob(pattern: &str) -> bool {
        pattern.split('.').any(|s| s == "*" || s == "**")
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        let parts: Vec<&str> = if name.is_empty() {
            Vec::new()
        } else {
            name.split('.').collect()
        };
        Self::match_segments(&self.segments, &parts)
    }

    fn match_segments(segments: &[GlobSegment], parts: &[&str]) -> bool {
        match segments.split_first() {
            None => parts.is_empty(),
            Some((GlobSegment::Many, rest)) => (0..=parts.len())
                .any(|skip| Self::match_segments(rest, &parts[skip..])),
            Some((segment, rest)) => match parts.split_first() {
                None => false,
                Some((part, tail)) => {
                    let hit = match segment {
                        GlobSegment::Literal(lit) => lit == part,
                        GlobSegment::One => true,
                        GlobSegment::Many => unreachable!(),
                    };
                    hit && Self::match_segments(rest, tail)
                }
            },
        }
    }
}

/// Resolve a possibly-relative state reference against a base state.
///
/// `^` walks to the base's parent (repeatable: `^.^.x`), a leading `.`
/// addresses a child of the base. Absolute names pass through.
pub fn resolve_relative(reference: &str, base: Option<&StateRef>) -> Result<String, ConfigError> {
    if !reference.starts_with('^') && !reference.starts_with('.') {
        return Ok(reference.to_string());
    }
    let base = base.ok_or_else(|| ConfigError::UnresolvableBase {
        reference: reference.to_string(),
        base: String::from("<none>"),
    })?;

    if let Some(child) = reference.strip_prefix('.') {
        return Ok(if base.is_root() {
            child.to_string()
        } else {
            format!("{}.{}", base.name(), child)
        });
    }

    // '^' chains: each leading '^' segment goes up one level.
    let mut cursor = base.clone();
    let mut segments = reference.split('.').peekable();
    while segments.peek() == Some(&"^") {
        segments.next();
        let parent = cursor.parent().cloned().ok_or_else(|| ConfigError::UnresolvableBase {
            reference: reference.to_string(),
            base: base.name().to_string(),
        })?;
        cursor = parent;
    }
    let remainder: Vec<&str> = segments.collect();
    let mut name = cursor.name().to_string();
    if !remainder.is_empty() {
        if name.is_empty() {
            name = remainder.join(".");
        } else {
            name = format!("{}.{}", name, remainder.join("."));
        }
    }
    Ok(name)
}

/// Lookup over the registry's name map, including future-state globs.
#[derive(Clone)]
pub struct StateMatcher {
    states: Arc<RwLock<HashMap<String, StateRef>>>,
}

impl StateMatcher {
    pub(crate) fn new(states: Arc<RwLock<HashMap<String, StateRef>>>) -> StateMatcher {
        StateMatcher { states }
    }

    /// Find a state by (possibly relative) name. When no exact match
    /// exists, future states whose glob covers the name are consulted,
    /// deepest placeholder first.
    pub fn find(&self, name: &str, base: Option<&StateRef>) -> Result<Option<StateRef>, ConfigError> {
        let name = resolve_relative(name, base)?;
        let states = self.states.read().expect("states lock");
        if let Some(state) = states.get(&name) {
            return Ok(Some(state.clone()));
        }

        let mut futures: Vec<&StateRef> = states
            .values()
            .filter(|s| s.is_future())
            .collect();
        futures.sort_by_key(|s| std::cmp::Reverse(s.name().len()));
        for state in futures {
            if Glob::new(state.name()).matches(&name) {
                return Ok(Some(state.clone()));
            }
        }
        Ok(None)
    }

    /// All registered states whose name matches a glob pattern.
    pub fn find_matching(&self, glob: &Glob) -> Vec<StateRef> {
        let states = self.states.read().expect("states lock");
        let mut hits: Vec<StateRef> = states
            .values()
            .filter(|s| glob.matches(s.name()))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name().cmp(b.name()));
        hits
    }
}
