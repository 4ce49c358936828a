//! Coverage-scored pattern router.
//!
//! The router holds an ordered list of case-insensitive regex rules, each
//! tagged with a handler identifier.  Routing evaluates every rule against
//! the input and scores each hit by how much of the text it consumed:
//!
//! ```text
//! coverage   = matched_chars / total_chars
//! confidence = min(0.9, coverage + 0.3)
//! ```
//!
//! The single highest-confidence hit wins.  A later rule only replaces the
//! current best when its confidence is strictly greater, so ties go to the
//! rule registered first.
//!
//! # Example
//!
//! ```rust
//! # use autho_kernel::router::PatternRouter;
//! let mut router = PatternRouter::new();
//! router.add_pattern(r"copy\s+(.+?)\s+to\s+(.+)", "copy_file").unwrap();
//!
//! let hit = router.best_match("copy a.txt to b.txt").unwrap();
//! assert_eq!(hit.handler, "copy_file");
//! assert_eq!(hit.group(1), Some("a.txt"));
//! ```

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Upper bound on the confidence a rule match can reach.
pub const MAX_RULE_CONFIDENCE: f64 = 0.9;

/// Flat bonus added to coverage for any rule match.
pub const RULE_CONFIDENCE_BONUS: f64 = 0.3;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The best rule hit for a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMatch {
    /// Handler identifier of the winning rule.
    pub handler: String,
    /// Registration index of the winning rule.
    pub rule_index: usize,
    /// The text span the rule matched.
    pub matched: String,
    /// Fraction of the input (in characters) the match covered.
    pub coverage: f64,
    /// `min(0.9, coverage + 0.3)`.
    pub confidence: f64,
    /// Positional capture groups, 1-based in the regex, 0-based here.
    /// Groups that did not participate in the match are `None`.
    pub groups: Vec<Option<String>>,
}

impl RouteMatch {
    /// Return positional group `n` (1-based, as in the regex).
    pub fn group(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .and_then(|g| g.as_deref())
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRoute {
    /// The handler identifier to report on match.
    pub handler: String,
    /// The original pattern string.
    pub pattern: String,
    compiled: Regex,
}

// ---------------------------------------------------------------------------
// PatternRouter
// ---------------------------------------------------------------------------

/// Ordered rule table resolving text to the best-covering handler.
#[derive(Debug, Clone, Default)]
pub struct PatternRouter {
    patterns: Vec<PatternRoute>,
}

impl PatternRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Register a rule.  Matching is case-insensitive.
    ///
    /// Returns an error if the regex fails to compile.
    pub fn add_pattern(&mut self, pattern: impl Into<String>, handler: impl Into<String>) -> Result<()> {
        let pattern = pattern.into();
        let handler = handler.into();

        let compiled = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| KernelError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;

        tracing::trace!(pattern = %pattern, handler = %handler, "pattern route added");

        self.patterns.push(PatternRoute {
            handler,
            pattern,
            compiled,
        });
        Ok(())
    }

    /// Score every rule against `text` and return the best hit.
    ///
    /// Returns `None` when nothing matches or the text is empty.
    pub fn best_match(&self, text: &str) -> Option<RouteMatch> {
        let total = text.chars().count();
        if total == 0 {
            return None;
        }

        let mut best: Option<RouteMatch> = None;

        for (index, route) in self.patterns.iter().enumerate() {
            let Some(caps) = route.compiled.captures(text) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };

            let coverage = whole.as_str().chars().count() as f64 / total as f64;
            let confidence = (coverage + RULE_CONFIDENCE_BONUS).min(MAX_RULE_CONFIDENCE);

            if best.as_ref().is_some_and(|b| confidence <= b.confidence) {
                continue;
            }

            let groups = caps
                .iter()
                .skip(1)
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect();

            best = Some(RouteMatch {
                handler: route.handler.clone(),
                rule_index: index,
                matched: whole.as_str().to_string(),
                coverage,
                confidence,
                groups,
            });
        }

        if let Some(hit) = &best {
            tracing::debug!(
                handler = %hit.handler,
                rule = hit.rule_index,
                confidence = hit.confidence,
                "pattern match"
            );
        }
        best
    }

    /// Return the registered rules in order.
    pub fn patterns(&self) -> &[PatternRoute] {
        &self.patterns
    }

    /// Return the number of registered rules.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
