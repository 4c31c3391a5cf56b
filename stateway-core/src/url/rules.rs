//! The prioritized rule list and its matching walk.

use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use super::rule::{MatchValue, UrlParts, UrlRule, UrlRuleHandler};

/// Result of matching a URL against the rule list.
#[derive(Clone, Debug)]
pub struct MatchResult {
    pub rule: Arc<UrlRule>,
    pub value: MatchValue,
    pub weight: f64,
}

struct RulesInner {
    rules: Vec<Arc<UrlRule>>,
    otherwise: Option<Arc<UrlRule>>,
    initial: Option<Arc<UrlRule>>,
    sorted: bool,
    next_id: u64,
}

/// Registry of URL rules, sorted lazily before each match.
///
/// Sort order: `priority` descending, rule-type weight descending, matcher
/// specificity, registration id. Rules with an equal sort key (ignoring
/// the id) form a *group*; within the group the highest
/// [`match_priority`](UrlRule::match_priority) wins.
#[derive(Clone)]
pub struct UrlRules {
    inner: Arc<Mutex<RulesInner>>,
}

impl Default for UrlRules {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlRules {
    pub fn new() -> Self {
        UrlRules {
            inner: Arc::new(Mutex::new(RulesInner {
                rules: Vec::new(),
                otherwise: None,
                initial: None,
                sorted: true,
                next_id: 0,
            })),
        }
    }

    /// Register a rule. Returns a handle whose `deregister()` removes it.
    pub fn rule(&self, mut rule: UrlRule) -> RuleHandle {
        let mut inner = self.inner.lock().expect("url rules lock");
        rule.id = inner.next_id;
        inner.next_id += 1;
        let id = rule.id;
        debug!(rule = ?rule, "url rule registered");
        inner.rules.push(Arc::new(rule));
        inner.sorted = false;
        RuleHandle {
            id,
            rules: Arc::downgrade(&self.inner),
        }
    }

    /// Register a matcher- or regex-backed rule with a handler
    /// (`when(matcher, handler)`).
    pub fn when(&self, rule: UrlRule, priority: Option<i32>) -> RuleHandle {
        self.rule(match priority {
            Some(p) => rule.with_priority(p),
            None => rule,
        })
    }

    /// Handler consulted when no rule matches.
    pub fn otherwise(&self, handler: UrlRuleHandler) {
        let mut inner = self.inner.lock().expect("url rules lock");
        inner.otherwise = Some(Arc::new(UrlRule::other(handler)));
    }

    /// Handler for the initial URL evaluation: fires only when the path is
    /// `""` or `"/"` and no transition has ever started.
    pub fn initial(&self, handler: UrlRuleHandler) {
        let mut inner = self.inner.lock().expect("url rules lock");
        inner.initial = Some(Arc::new(UrlRule::other(handler)));
    }

    pub(crate) fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().expect("url rules lock");
        inner.rules.retain(|r| r.id != id);
    }

    /// Snapshot of the rules in match order.
    pub fn rules(&self) -> Vec<Arc<UrlRule>> {
        let mut inner = self.inner.lock().expect("url rules lock");
        Self::ensure_sorted(&mut inner);
        inner.rules.clone()
    }

    pub(crate) fn otherwise_rule(&self) -> Option<Arc<UrlRule>> {
        self.inner.lock().expect("url rules lock").otherwise.clone()
    }

    pub(crate) fn initial_rule(&self) -> Option<Arc<UrlRule>> {
        self.inner.lock().expect("url rules lock").initial.clone()
    }

    fn ensure_sorted(inner: &mut RulesInner) {
        if !inner.sorted {
            inner.rules.sort_by(|a, b| UrlRule::compare(a, b));
            inner.sorted = true;
        }
    }

    /// Walk the sorted rules and find the best match.
    ///
    /// The walk stops once a match is held and the next rule sorts into a
    /// strictly later group; within a group every rule is tried and the
    /// highest match weight wins.
    pub fn match_url(&self, parts: &UrlParts) -> Option<MatchResult> {
        let rules = {
            let mut inner = self.inner.lock().expect("url rules lock");
            Self::ensure_sorted(&mut inner);
            inner.rules.clone()
        };

        let mut best: Option<MatchResult> = None;
        for rule in &rules {
            if let Some(current) = &best {
                if UrlRule::compare_group(rule, &current.rule).is_gt() {
                    break;
                }
            }
            let Some(value) = rule.matches(parts) else {
                continue;
            };
            let weight = rule.match_priority(&value);
            let better = match &best {
                None => true,
                Some(current) => weight > current.weight,
            };
            if better {
                best = Some(MatchResult {
                    rule: rule.clone(),
                    value,
                    weight,
                });
            }
        }
        if let Some(m) = &best {
            debug!(rule = ?m.rule, path = %parts.path, "url rule matched");
        }
        best
    }
}

/// Deregistration handle for a single rule. Dropping the handle does
/// nothing; call [`deregister`](RuleHandle::deregister) to remove the rule.
pub struct RuleHandle {
    id: u64,
    rules: Weak<Mutex<RulesInner>>,
}

impl RuleHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deregister(self) {
        if let Some(rules) = self.rules.upgrade() {
            rules
                .lock()
                .expect("url rules lock")
                .rules
                .retain(|r| r.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamTypes;
    use crate::url::matcher::{MatcherConfig, UrlMatcher};
    use crate::url::rule::RuleOutcome;
    use std::collections::HashMap;

    fn matcher(pattern: &str) -> UrlMatcher {
        let types = ParamTypes::new();
        UrlMatcher::compile(pattern, &types, &MatcherConfig::default(), &HashMap::new()).unwrap()
    }

    fn redirect_rule(pattern: &str, to: &str) -> UrlRule {
        UrlRule::from_matcher(
            matcher(pattern),
            UrlRuleHandler::RedirectPattern(to.to_string()),
        )
    }

    fn matched_redirect(rules: &UrlRules, url: &str) -> Option<String> {
        let parts = UrlParts::parse(url);
        let m = rules.match_url(&parts)?;
        match m.rule.handle(&m.value, &parts) {
            RuleOutcome::Redirect(target) => Some(target),
            _ => None,
        }
    }

    #[test]
    fn higher_priority_wins() {
        let rules = UrlRules::new();
        rules.when(redirect_rule("/a", "/low"), None);
        rules.when(redirect_rule("/a", "/high"), Some(10));
        assert_eq!(matched_redirect(&rules, "/a").unwrap(), "/high");
    }

    #[test]
    fn more_specific_matcher_wins_regardless_of_registration_order() {
        let rules = UrlRules::new();
        rules.when(redirect_rule("/foo/:p1/:p2", "/params"), None);
        rules.when(redirect_rule("/foo/:p1/AAA", "/static"), None);
        assert_eq!(matched_redirect(&rules, "/foo/xyz/AAA").unwrap(), "/static");
    }

    #[test]
    fn registration_order_breaks_exact_ties() {
        let rules = UrlRules::new();
        rules.when(redirect_rule("/t/:x", "/first"), None);
        rules.when(redirect_rule("/t/:y", "/second"), None);
        assert_eq!(matched_redirect(&rules, "/t/1").unwrap(), "/first");
    }

    #[test]
    fn deregistration_removes_rule() {
        let rules = UrlRules::new();
        let handle = rules.when(redirect_rule("/a", "/gone"), None);
        rules.when(redirect_rule("/b", "/stays"), None);
        handle.deregister();
        assert!(matched_redirect(&rules, "/a").is_none());
        assert_eq!(matched_redirect(&rules, "/b").unwrap(), "/stays");
    }

    #[test]
    fn no_match_returns_none() {
        let rules = UrlRules::new();
        rules.when(redirect_rule("/a", "/x"), None);
        assert!(rules.match_url(&UrlParts::parse("/nowhere")).is_none());
    }

    #[test]
    fn ids_are_monotonic() {
        let rules = UrlRules::new();
        let a = rules.when(redirect_rule("/a", "/1"), None);
        let b = rules.when(redirect_rule("/b", "/2"), None);
        assert!(a.id() < b.id());
    }
}
