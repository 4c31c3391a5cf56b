use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::state::TargetState;

use super::matcher::UrlMatcher;

/// A URL split into the pieces rules match against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlParts {
    pub path: String,
    pub search: HashMap<String, Vec<String>>,
    pub hash: String,
}

impl UrlParts {
    /// Split `path?query#hash` text into parts. The query is parsed with
    /// multi-value collection (`?a=1&a=2` yields `a -> [1, 2]`).
    pub fn parse(url: &str) -> UrlParts {
        let (rest, hash) = match url.split_once('#') {
            Some((r, h)) => (r, h.to_string()),
            None => (url, String::new()),
        };
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p.to_string(), q),
            None => (rest.to_string(), ""),
        };
        let mut search: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            search.entry(k.into_owned()).or_default().push(v.into_owned());
        }
        UrlParts { path, search, hash }
    }
}

/// What a matched rule's handler asks the router to do.
#[derive(Clone, Debug)]
pub enum RuleOutcome {
    /// Rewrite the URL (replacing the history entry when the match came
    /// from URL synchronization).
    Redirect(String),
    /// Navigate to a state.
    Target(TargetState),
    /// The handler took care of everything (or nothing); no action.
    Handled,
}

/// The value produced by a rule's match function, handed to its handler.
#[derive(Clone, Debug)]
pub enum MatchValue {
    /// Decoded parameter values (state and matcher rules).
    Params(HashMap<String, Value>),
    /// Raw capture groups (regex rules); index 0 is the whole match.
    Captures(Vec<Option<String>>),
    /// A pre-computed outcome (raw rules fold match and handle together).
    Outcome(RuleOutcome),
}

/// Discriminant of the five rule kinds, in descending match weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlRuleType {
    State,
    UrlMatcher,
    Regex,
    Raw,
    Other,
}

impl UrlRuleType {
    /// Sort weight: state/matcher rules outrank regex, then raw, then
    /// everything else.
    pub fn weight(self) -> u8 {
        match self {
            UrlRuleType::State | UrlRuleType::UrlMatcher => 4,
            UrlRuleType::Regex => 3,
            UrlRuleType::Raw => 2,
            UrlRuleType::Other => 1,
        }
    }
}

/// Handler attached to a matcher- or regex-backed rule.
#[derive(Clone)]
pub enum UrlRuleHandler {
    /// Redirect to an interpolated URL: `:name` tokens for matcher rules,
    /// `$N` backrefs for regex rules.
    RedirectPattern(String),
    /// Navigate to a fixed target.
    Target(TargetState),
    /// Arbitrary handler.
    Fn(Arc<dyn Fn(&MatchValue, &UrlParts) -> RuleOutcome + Send + Sync>),
}

impl fmt::Debug for UrlRuleHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlRuleHandler::RedirectPattern(p) => write!(f, "RedirectPattern({p:?})"),
            UrlRuleHandler::Target(t) => write!(f, "Target({:?})", t.name()),
            UrlRuleHandler::Fn(_) => write!(f, "Fn(..)"),
        }
    }
}

type MatchFn = Arc<dyn Fn(&UrlParts) -> Option<MatchValue> + Send + Sync>;
type HandlerFn = Arc<dyn Fn(&MatchValue, &UrlParts) -> RuleOutcome + Send + Sync>;

/// One prioritized URL rule: a match function plus a handler, tagged with
/// its kind and (after registration) a monotonic id.
#[derive(Clone)]
pub struct UrlRule {
    pub(crate) id: u64,
    pub(crate) priority: i32,
    rule_type: UrlRuleType,
    matcher: Option<UrlMatcher>,
    match_fn: MatchFn,
    handler: HandlerFn,
}

impl fmt::Debug for UrlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlRule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("type", &self.rule_type)
            .field("pattern", &self.matcher.as_ref().map(|m| m.pattern().to_string()))
            .finish()
    }
}

impl UrlRule {
    // ── Constructors ────────────────────────────────────────────────────────

    /// Rule backing a registered state: matching produces a target pointing
    /// at the state with the decoded parameter values.
    pub fn for_state(state_name: impl Into<String>, matcher: UrlMatcher) -> UrlRule {
        let name = state_name.into();
        let exec_matcher = matcher.clone();
        UrlRule {
            id: 0,
            priority: 0,
            rule_type: UrlRuleType::State,
            match_fn: Arc::new(move |parts: &UrlParts| {
                exec_matcher
                    .exec(&parts.path, &parts.search, &parts.hash)
                    .map(MatchValue::Params)
            }),
            handler: Arc::new(move |value: &MatchValue, _parts: &UrlParts| match value {
                MatchValue::Params(params) => {
                    RuleOutcome::Target(TargetState::for_url_match(&name, params.clone()))
                }
                _ => RuleOutcome::Handled,
            }),
            matcher: Some(matcher),
        }
    }

    /// Rule from a standalone matcher (`when('/old/:id', ...)`).
    pub fn from_matcher(matcher: UrlMatcher, handler: UrlRuleHandler) -> UrlRule {
        let exec_matcher = matcher.clone();
        UrlRule {
            id: 0,
            priority: 0,
            rule_type: UrlRuleType::UrlMatcher,
            match_fn: Arc::new(move |parts: &UrlParts| {
                exec_matcher
                    .exec(&parts.path, &parts.search, &parts.hash)
                    .map(MatchValue::Params)
            }),
            handler: handler_fn(handler, InterpolationStyle::ParamNames),
            matcher: Some(matcher),
        }
    }

    /// Rule from a raw regex over the path.
    pub fn from_regex(regex: Regex, handler: UrlRuleHandler) -> UrlRule {
        UrlRule {
            id: 0,
            priority: 0,
            rule_type: UrlRuleType::Regex,
            match_fn: Arc::new(move |parts: &UrlParts| {
                regex.captures(&parts.path).map(|caps| {
                    MatchValue::Captures(
                        (0..caps.len())
                            .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                            .collect(),
                    )
                })
            }),
            handler: handler_fn(handler, InterpolationStyle::Backrefs),
            matcher: None,
        }
    }

    /// Rule from one combined match-and-handle function.
    pub fn raw(f: impl Fn(&UrlParts) -> Option<RuleOutcome> + Send + Sync + 'static) -> UrlRule {
        UrlRule {
            id: 0,
            priority: 0,
            rule_type: UrlRuleType::Raw,
            match_fn: Arc::new(move |parts: &UrlParts| f(parts).map(MatchValue::Outcome)),
            handler: Arc::new(|value: &MatchValue, _| match value {
                MatchValue::Outcome(outcome) => outcome.clone(),
                _ => RuleOutcome::Handled,
            }),
            matcher: None,
        }
    }

    /// Catch-all rule (used for `otherwise` and `initial` handlers).
    pub fn other(handler: UrlRuleHandler) -> UrlRule {
        UrlRule {
            id: 0,
            priority: 0,
            rule_type: UrlRuleType::Other,
            match_fn: Arc::new(|_parts: &UrlParts| {
                Some(MatchValue::Params(HashMap::new()))
            }),
            handler: handler_fn(handler, InterpolationStyle::ParamNames),
            matcher: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> UrlRule {
        self.priority = priority;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn rule_type(&self) -> UrlRuleType {
        self.rule_type
    }

    pub fn matcher(&self) -> Option<&UrlMatcher> {
        self.matcher.as_ref()
    }

    // ── Matching ────────────────────────────────────────────────────────────

    pub fn matches(&self, parts: &UrlParts) -> Option<MatchValue> {
        (self.match_fn)(parts)
    }

    /// Rank among equal-sort-key matches: matcher-backed rules score by the
    /// fraction of optional parameters matched with a non-default value;
    /// rules with no optional parameters use a small epsilon so they still
    /// outrank an all-defaults match.
    pub fn match_priority(&self, value: &MatchValue) -> f64 {
        let (Some(matcher), MatchValue::Params(params)) = (&self.matcher, value) else {
            return 0.0;
        };
        let optional: Vec<_> = matcher
            .parameters()
            .into_iter()
            .filter(|p| p.is_optional())
            .collect();
        if optional.is_empty() {
            return 0.000_001;
        }
        let matched = optional
            .iter()
            .filter(|p| {
                params
                    .get(p.id())
                    .map(|v| !v.is_null() && !p.is_default_value(v))
                    .unwrap_or(false)
            })
            .count();
        matched as f64 / optional.len() as f64
    }

    pub fn handle(&self, value: &MatchValue, parts: &UrlParts) -> RuleOutcome {
        (self.handler)(value, parts)
    }

    /// Sort-key comparison *excluding* the id tie-break: rules comparing
    /// equal here form one match group.
    pub fn compare_group(a: &UrlRule, b: &UrlRule) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then(b.rule_type.weight().cmp(&a.rule_type.weight()))
            .then_with(|| match (&a.matcher, &b.matcher) {
                (Some(ma), Some(mb)) => UrlMatcher::compare(ma, mb),
                _ => Ordering::Equal,
            })
    }

    /// Full sort order: group key, then registration id.
    pub fn compare(a: &UrlRule, b: &UrlRule) -> Ordering {
        UrlRule::compare_group(a, b).then(a.id.cmp(&b.id))
    }
}

enum InterpolationStyle {
    /// `:name` tokens replaced from matched params.
    ParamNames,
    /// `$1`..`$9` replaced from capture groups.
    Backrefs,
}

fn handler_fn(handler: UrlRuleHandler, style: InterpolationStyle) -> HandlerFn {
    match handler {
        UrlRuleHandler::Fn(f) => f,
        UrlRuleHandler::Target(target) => {
            Arc::new(move |value: &MatchValue, _| {
                let target = match value {
                    MatchValue::Params(params) => target.clone().with_merged_params(params.clone()),
                    _ => target.clone(),
                };
                RuleOutcome::Target(target)
            })
        }
        UrlRuleHandler::RedirectPattern(pattern) => Arc::new(move |value: &MatchValue, _| {
            RuleOutcome::Redirect(match (&style, value) {
                (InterpolationStyle::ParamNames, MatchValue::Params(params)) => {
                    interpolate_params(&pattern, params)
                }
                (InterpolationStyle::Backrefs, MatchValue::Captures(caps)) => {
                    interpolate_backrefs(&pattern, caps)
                }
                _ => pattern.clone(),
            })
        }),
    }
}

fn value_as_url_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn interpolate_params(pattern: &str, params: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ':' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&nc) = chars.peek() {
            if nc.is_ascii_alphanumeric() || nc == '_' {
                name.push(nc);
                chars.next();
            } else {
                break;
            }
        }
        match params.get(&name) {
            Some(v) => out.push_str(&value_as_url_text(v)),
            None => {
                out.push(':');
                out.push_str(&name);
            }
        }
    }
    out
}

fn interpolate_backrefs(pattern: &str, captures: &[Option<String>]) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().and_then(|d| d.to_digit(10)) {
            Some(n) => {
                chars.next();
                if let Some(Some(text)) = captures.get(n as usize) {
                    out.push_str(text);
                }
            }
            None => out.push('$'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_parts_parse_splits_components() {
        let parts = UrlParts::parse("/a/b?x=1&x=2&y=z#frag");
        assert_eq!(parts.path, "/a/b");
        assert_eq!(parts.search["x"], vec!["1", "2"]);
        assert_eq!(parts.search["y"], vec!["z"]);
        assert_eq!(parts.hash, "frag");
    }

    #[test]
    fn interpolation_with_param_names() {
        let params = HashMap::from([(String::from("id"), json!("42"))]);
        assert_eq!(interpolate_params("/new/:id/view", &params), "/new/42/view");
        assert_eq!(interpolate_params("/keep/:other", &params), "/keep/:other");
    }

    #[test]
    fn interpolation_with_backrefs() {
        let caps = vec![
            Some("whole".to_string()),
            Some("first".to_string()),
            None,
        ];
        assert_eq!(interpolate_backrefs("/x/$1/$2/$$", &caps), "/x/first//$$");
    }

    #[test]
    fn regex_rule_matches_path_only() {
        let rule = UrlRule::from_regex(
            Regex::new("^/old/(.*)$").unwrap(),
            UrlRuleHandler::RedirectPattern("/new/$1".into()),
        );
        let parts = UrlParts::parse("/old/thing?q=1");
        let value = rule.matches(&parts).unwrap();
        match rule.handle(&value, &parts) {
            RuleOutcome::Redirect(url) => assert_eq!(url, "/new/thing"),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn type_weights_order() {
        assert!(UrlRuleType::State.weight() == UrlRuleType::UrlMatcher.weight());
        assert!(UrlRuleType::UrlMatcher.weight() > UrlRuleType::Regex.weight());
        assert!(UrlRuleType::Regex.weight() > UrlRuleType::Raw.weight());
        assert!(UrlRuleType::Raw.weight() > UrlRuleType::Other.weight());
    }
}
