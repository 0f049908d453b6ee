//! Request classification against signatures and custom rules.
//!
//! # Evaluation Order
//! ```text
//! normalized text
//!     → SignatureCatalog (sql_injection, xss, path_traversal; declared order)
//!     → RuleStore rules (creation order)
//!     → first match wins
//! ```

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use regex::Regex;

use crate::security::signatures::{compile_case_insensitive, AttackCategory, SignatureCatalog};
use crate::storage::RuleStore;

/// What a malicious request matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Signature(AttackCategory),
    CustomRule(i64),
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Signature(category) => f.write_str(category.label()),
            Classification::CustomRule(id) => write!(f, "custom_rule_{}", id),
        }
    }
}

/// Composes the signature catalog with the operator rule store.
pub struct PatternMatcher {
    catalog: SignatureCatalog,
    rules: RuleStore,
    /// Compiled custom patterns, keyed by pattern text.
    compiled: DashMap<String, Regex>,
}

impl PatternMatcher {
    pub fn new(catalog: SignatureCatalog, rules: RuleStore) -> Self {
        Self {
            catalog,
            rules,
            compiled: DashMap::new(),
        }
    }

    /// Classify normalized request text, or `None` if nothing matches.
    pub fn classify(&self, text: &str) -> Option<Classification> {
        if let Some(category) = self.catalog.classify(text) {
            return Some(Classification::Signature(category));
        }
        self.classify_custom(text)
    }

    fn classify_custom(&self, text: &str) -> Option<Classification> {
        let rules = match self.rules.list() {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load custom rules; evaluating signatures only");
                return None;
            }
        };

        if self.compiled.len() > rules.len() {
            let live: HashSet<&str> = rules.iter().map(|r| r.pattern.as_str()).collect();
            self.compiled.retain(|pattern, _| live.contains(pattern.as_str()));
        }

        for rule in &rules {
            let cached = self.compiled.get(&rule.pattern).map(|re| re.is_match(text));
            let matched = match cached {
                Some(matched) => matched,
                None => match compile_case_insensitive(&rule.pattern) {
                    Ok(re) => {
                        let matched = re.is_match(text);
                        self.compiled.insert(rule.pattern.clone(), re);
                        matched
                    }
                    Err(e) => {
                        tracing::warn!(rule_id = rule.id, error = %e, "Skipping custom rule that does not compile");
                        continue;
                    }
                },
            };

            if matched {
                return Some(Classification::CustomRule(rule.id));
            }
        }

        None
    }
}
