//! The URL subsystem: pattern matching, the prioritized rule engine, and
//! the URL service gluing them to a location provider.

mod config;
mod matcher;
mod rule;
mod rules;
mod service;

pub use config::UrlMatcherFactory;
pub use matcher::{MatcherConfig, UrlMatcher};
pub use rule::{MatchValue, RuleOutcome, UrlParts, UrlRule, UrlRuleHandler, UrlRuleType};
pub use rules::{MatchResult, RuleHandle, UrlRules};
pub use service::UrlService;
