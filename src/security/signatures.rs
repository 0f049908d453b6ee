//! Built-in attack signatures.
//!
//! Signatures are written against the normalized request text (lowercased
//! `method path query body`) and compiled once, case-insensitively.
//! Category order and pattern order are part of the classification contract.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Attack category of a built-in signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackCategory {
    SqlInjection,
    Xss,
    PathTraversal,
}

impl AttackCategory {
    /// Evaluation order.
    pub const ALL: [AttackCategory; 3] = [
        AttackCategory::SqlInjection,
        AttackCategory::Xss,
        AttackCategory::PathTraversal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AttackCategory::SqlInjection => "sql_injection",
            AttackCategory::Xss => "xss",
            AttackCategory::PathTraversal => "path_traversal",
        }
    }

    fn patterns(&self) -> &'static [&'static str] {
        match self {
            AttackCategory::SqlInjection => &[
                r"\b(union|select|from|where|drop|alter|insert|delete)\b.*?\b(all|distinct|top|into|group|having)\b",
                r#"['"]?\s*--"#,
                r"1\s*=\s*1",
                r"/\*.*?\*/",
            ],
            AttackCategory::Xss => &[
                r"<\s*script\b[^>]*>",
                r#"\bon\w+\s*=\s*['"]?.*?['"]?"#,
                r"javascript\s*:\s*",
                r#"<\s*(img|iframe|embed|object)\b[^>]*\bsrc\s*=\s*['"]?\s*javascript:"#,
            ],
            AttackCategory::PathTraversal => &[
                r"\.\./",
                r"\.\.%2f",
                r"etc/(passwd|shadow|hosts)",
                r"windows/.*?\.(ini|conf)",
            ],
        }
    }
}

impl fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Compile a pattern the way every signature and custom rule is matched.
pub fn compile_case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// The immutable set of built-in signatures, grouped by category.
pub struct SignatureCatalog {
    categories: Vec<(AttackCategory, Vec<Regex>)>,
}

impl SignatureCatalog {
    pub fn new() -> Self {
        let categories = AttackCategory::ALL
            .iter()
            .map(|category| {
                let compiled = category
                    .patterns()
                    .iter()
                    .map(|p| compile_case_insensitive(p).expect("built-in signature must compile"))
                    .collect();
                (*category, compiled)
            })
            .collect();

        Self { categories }
    }

    /// First category with a matching signature, in declared order.
    pub fn classify(&self, text: &str) -> Option<AttackCategory> {
        self.categories
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
            .map(|(category, _)| *category)
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, p)| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignatureCatalog {
    fn default() -> Self {
        Self::new()
    }
}
