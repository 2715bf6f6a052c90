//! Producer-side include/exclude pattern evaluation.
//!
//! Include patterns win: when any include pattern exists and one matches the
//! message, the event passes and exclude patterns are not consulted. A
//! pattern that fails to compile is kept as a never-matching slot so an
//! include list of only broken patterns still rejects everything, and a
//! broken exclude pattern excludes nothing.

use regex::Regex;

/// A compiled pattern slot. `None` means the source pattern did not compile.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    compiled: Option<Regex>,
}

impl Pattern {
    pub fn compile(source: &str) -> Self {
        let compiled = match Regex::new(source) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(pattern = source, %err, "Invalid filter pattern, treating as non-matching");
                None
            }
        };
        Self {
            source: source.to_string(),
            compiled,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, message: &str) -> bool {
        self.compiled.as_ref().is_some_and(|re| re.is_match(message))
    }
}

/// An include/exclude pattern pair evaluated per emitted event.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl FilterSet {
    pub fn compile(include_patterns: &[String], exclude_patterns: &[String]) -> Self {
        Self {
            includes: include_patterns.iter().map(|p| Pattern::compile(p)).collect(),
            excludes: exclude_patterns.iter().map(|p| Pattern::compile(p)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Include-wins evaluation: with includes present, pass iff one matches
    /// (excludes are not consulted on a match); otherwise drop on any
    /// exclude match.
    pub fn passes(&self, message: &str) -> bool {
        if !self.includes.is_empty() {
            return self.includes.iter().any(|p| p.matches(message));
        }
        !self.excludes.iter().any(|p| p.matches(message))
    }
}
