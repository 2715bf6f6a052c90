//! Per-link subscriptions and broker-side filter evaluation.
//!
//! Predicates run in order: levels, sources, include patterns, exclude
//! patterns. Under the default [`FilterRule::Conjunctive`] rule includes
//! and excludes must both pass; [`FilterRule::IncludeWins`] mirrors the
//! producer rule where a matched include short-circuits the excludes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::event::{Event, Level};
use crate::link::SubscriptionFilters;
use crate::trace::Pattern;

/// How a subscription combines include and exclude patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterRule {
    /// Include and exclude predicates must both pass
    #[default]
    Conjunctive,
    /// A matched include delivers regardless of excludes
    IncludeWins,
}

/// A link's declared interest in one route, with compiled predicates.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub route: String,
    levels: HashSet<Level>,
    sources: HashSet<String>,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl Subscription {
    pub fn compile(route: String, filters: SubscriptionFilters) -> Self {
        Self {
            route,
            levels: filters.levels.unwrap_or_default().into_iter().collect(),
            sources: filters.sources.unwrap_or_default().into_iter().collect(),
            includes: filters
                .include_patterns
                .unwrap_or_default()
                .iter()
                .map(|p| Pattern::compile(p))
                .collect(),
            excludes: filters
                .exclude_patterns
                .unwrap_or_default()
                .iter()
                .map(|p| Pattern::compile(p))
                .collect(),
        }
    }

    /// Evaluate every applicable predicate against the event.
    pub fn accepts(&self, event: &Event, rule: FilterRule) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&event.level) {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.contains(&event.source) {
            return false;
        }
        if !self.includes.is_empty() {
            let included = self.includes.iter().any(|p| p.matches(&event.message));
            if !included {
                return false;
            }
            if rule == FilterRule::IncludeWins {
                return true;
            }
        }
        !self.excludes.iter().any(|p| p.matches(&event.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(level: Level, source: &str, message: &str) -> Event {
        Event {
            id: "e-1".to_string(),
            timestamp: "2026-08-02T10:00:00.000Z".to_string(),
            level,
            message: message.to_string(),
            source: source.to_string(),
            thread_id: 1,
            nesting_level: 0,
            data: None,
            stack: None,
            trace: None,
        }
    }

    fn filters() -> SubscriptionFilters {
        SubscriptionFilters::default()
    }

    #[test]
    fn empty_filters_accept_everything() {
        let sub = Subscription::compile("/".to_string(), filters());
        assert!(sub.accepts(&event(Level::Debug, "any", "msg"), FilterRule::Conjunctive));
    }

    #[test]
    fn level_predicate() {
        let sub = Subscription::compile(
            "/".to_string(),
            SubscriptionFilters {
                levels: Some(vec![Level::Warn, Level::Error]),
                ..filters()
            },
        );
        assert!(sub.accepts(&event(Level::Error, "s", "m"), FilterRule::Conjunctive));
        assert!(!sub.accepts(&event(Level::Info, "s", "m"), FilterRule::Conjunctive));
    }

    #[test]
    fn source_predicate() {
        let sub = Subscription::compile(
            "/".to_string(),
            SubscriptionFilters {
                sources: Some(vec!["api".to_string()]),
                ..filters()
            },
        );
        assert!(sub.accepts(&event(Level::Info, "api", "m"), FilterRule::Conjunctive));
        assert!(!sub.accepts(&event(Level::Info, "worker", "m"), FilterRule::Conjunctive));
    }

    #[test]
    fn conjunctive_applies_excludes_after_include_match() {
        let sub = Subscription::compile(
            "/".to_string(),
            SubscriptionFilters {
                include_patterns: Some(vec![".*important.*".to_string()]),
                exclude_patterns: Some(vec![".*message.*".to_string()]),
                ..filters()
            },
        );
        // Matches both: conjunctive rule drops it
        assert!(!sub.accepts(
            &event(Level::Info, "s", "an important message"),
            FilterRule::Conjunctive
        ));
        assert!(sub.accepts(
            &event(Level::Info, "s", "an important note"),
            FilterRule::Conjunctive
        ));
    }

    #[test]
    fn include_wins_short_circuits_excludes() {
        let sub = Subscription::compile(
            "/".to_string(),
            SubscriptionFilters {
                include_patterns: Some(vec![".*important.*".to_string()]),
                exclude_patterns: Some(vec![".*message.*".to_string()]),
                ..filters()
            },
        );
        assert!(sub.accepts(
            &event(Level::Info, "s", "an important message"),
            FilterRule::IncludeWins
        ));
    }

    #[test]
    fn invalid_pattern_does_not_exclude() {
        let sub = Subscription::compile(
            "/".to_string(),
            SubscriptionFilters {
                exclude_patterns: Some(vec!["(broken".to_string()]),
                ..filters()
            },
        );
        assert!(sub.accepts(&event(Level::Info, "s", "anything"), FilterRule::Conjunctive));
    }

    #[test]
    fn predicates_compose() {
        let sub = Subscription::compile(
            "/".to_string(),
            SubscriptionFilters {
                levels: Some(vec![Level::Error]),
                sources: Some(vec!["api".to_string()]),
                include_patterns: Some(vec!["timeout".to_string()]),
                ..filters()
            },
        );
        assert!(sub.accepts(
            &event(Level::Error, "api", "request timeout"),
            FilterRule::Conjunctive
        ));
        assert!(!sub.accepts(
            &event(Level::Error, "api", "request failed"),
            FilterRule::Conjunctive
        ));
        assert!(!sub.accepts(
            &event(Level::Warn, "api", "request timeout"),
            FilterRule::Conjunctive
        ));
    }

    #[test]
    fn filter_rule_serde_values() {
        assert_eq!(
            serde_json::to_string(&FilterRule::IncludeWins).unwrap(),
            r#""includeWins""#
        );
        assert_eq!(
            serde_json::from_str::<FilterRule>(r#""conjunctive""#).unwrap(),
            FilterRule::Conjunctive
        );
    }
}
