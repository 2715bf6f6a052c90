//! Filter semantics: producer include-wins, scope overrides, broker rules.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use tracefab::broker::{FilterRule, Subscription};
use tracefab::link::SubscriptionFilters;
use tracefab::{Event, Level, ScopeConfig, Tracer, TracerConfig};

fn sink_bodies(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(|line| {
                    line.split_once("] ")
                        .map(|(_, body)| body.to_string())
                        .unwrap_or_else(|| line.to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn tracer_with(path: &Path, config: TracerConfig) -> Tracer {
    Tracer::builder(config.with_source("test").with_error_stack_depth(0))
        .file_sink(path, true)
        .expect("file sink")
        .build()
}

fn event(level: Level, source: &str, message: &str) -> Event {
    Event {
        id: "f-1".to_string(),
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

// ═══════════════════════════════════════════════════════════════
// Scenario 3: producer include-wins priority
// ═══════════════════════════════════════════════════════════════

#[test]
fn include_match_short_circuits_exclude() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.log");
    let tracer = tracer_with(
        &path,
        TracerConfig::default()
            .with_include_patterns([".*important.*"])
            .with_exclude_patterns([".*message.*"]),
    );

    // Matches both patterns: include takes priority, event is delivered
    tracer.trace_entry("an important message", None);

    let bodies = sink_bodies(&path);
    assert_eq!(bodies, vec!["|>>> Call an important message"]);
}

#[test]
fn include_miss_drops_the_event() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.log");
    let tracer = tracer_with(
        &path,
        TracerConfig::default().with_include_patterns([".*important.*"]),
    );

    tracer.trace_entry("routine chatter", None);
    assert!(sink_bodies(&path).is_empty());
}

#[test]
fn excludes_apply_only_without_an_include_match() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.log");
    let tracer = tracer_with(
        &path,
        TracerConfig::default().with_exclude_patterns(["drop-me"]),
    );

    tracer.info("drop-me please");
    tracer.info("keep me");
    assert_eq!(sink_bodies(&path), vec!["keep me"]);
}

// ═══════════════════════════════════════════════════════════════
// Scope-level filter overrides
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn scope_filters_override_tracer_filters() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.log");
    let tracer = tracer_with(
        &path,
        TracerConfig::default().with_exclude_patterns(["inner"]),
    );

    tracer
        .run_scoped(
            ScopeConfig::default().with_include_patterns(["inner.*"]),
            async {
                // Scope includes win over the tracer-level exclude
                tracer.info("inner detail");
                tracer.info("unrelated");
            },
        )
        .await;
    tracer.info("inner detail");

    // Inside the scope: only "inner detail" passes. Outside: the
    // tracer-level exclude drops it.
    assert_eq!(sink_bodies(&path), vec!["inner detail"]);
}

// ═══════════════════════════════════════════════════════════════
// Broker-side rules
// ═══════════════════════════════════════════════════════════════

#[test]
fn broker_conjunctive_rule_differs_from_producer_rule() {
    let sub = Subscription::compile(
        "/".to_string(),
        SubscriptionFilters {
            include_patterns: Some(vec![".*important.*".to_string()]),
            exclude_patterns: Some(vec![".*message.*".to_string()]),
            ..Default::default()
        },
    );
    let ev = event(Level::Info, "s", "an important message");

    // The same event that scenario 3 delivers producer-side is dropped
    // under the broker's default conjunctive rule, and delivered when the
    // broker is configured with includeWins.
    assert!(!sub.accepts(&ev, FilterRule::Conjunctive));
    assert!(sub.accepts(&ev, FilterRule::IncludeWins));
}

#[test]
fn broker_predicates_evaluate_in_order() {
    let sub = Subscription::compile(
        "/".to_string(),
        SubscriptionFilters {
            levels: Some(vec![Level::Error]),
            sources: Some(vec!["api".to_string()]),
            include_patterns: Some(vec!["timeout".to_string()]),
            exclude_patterns: Some(vec!["retry".to_string()]),
            ..Default::default()
        },
    );

    assert!(sub.accepts(
        &event(Level::Error, "api", "request timeout"),
        FilterRule::Conjunctive
    ));
    // Each failing predicate alone is enough to drop
    assert!(!sub.accepts(
        &event(Level::Warn, "api", "request timeout"),
        FilterRule::Conjunctive
    ));
    assert!(!sub.accepts(
        &event(Level::Error, "worker", "request timeout"),
        FilterRule::Conjunctive
    ));
    assert!(!sub.accepts(
        &event(Level::Error, "api", "request failed"),
        FilterRule::Conjunctive
    ));
    assert!(!sub.accepts(
        &event(Level::Error, "api", "timeout, will retry"),
        FilterRule::Conjunctive
    ));
}

#[test]
fn invalid_patterns_never_match() {
    // Broken exclude: excludes nothing
    let sub = Subscription::compile(
        "/".to_string(),
        SubscriptionFilters {
            exclude_patterns: Some(vec!["(broken".to_string()]),
            ..Default::default()
        },
    );
    assert!(sub.accepts(&event(Level::Info, "s", "anything"), FilterRule::Conjunctive));

    // Broken include: can never admit
    let sub = Subscription::compile(
        "/".to_string(),
        SubscriptionFilters {
            include_patterns: Some(vec!["(broken".to_string()]),
            ..Default::default()
        },
    );
    assert!(!sub.accepts(&event(Level::Info, "s", "anything"), FilterRule::Conjunctive));
}
