//! Operator-defined detection rules.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Database, StorageError, StorageResult};
use crate::security::signatures::compile_case_insensitive;

/// A custom rule as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub pattern: String,
    pub description: String,
}

/// Errors from adding a rule.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Pattern is required")]
    EmptyPattern,

    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Durable, creation-ordered collection of custom rules.
#[derive(Clone)]
pub struct RuleStore {
    db: Database,
}

impl RuleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validate and persist a new rule, returning its id.
    ///
    /// The pattern is compiled exactly as the matcher will compile it before
    /// anything is written, so a stored rule always compiles at match time.
    pub fn add(&self, pattern: &str, description: &str) -> Result<i64, RuleError> {
        if pattern.is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        compile_case_insensitive(pattern)?;

        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rules (pattern, description) VALUES (?1, ?2)",
                params![pattern, description],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        tracing::info!(rule_id = id, pattern = %pattern, "Custom rule added");
        Ok(id)
    }

    /// All rules in creation order.
    pub fn list(&self) -> StorageResult<Vec<Rule>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, pattern, description FROM rules ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Rule {
                    id: row.get(0)?,
                    pattern: row.get(1)?,
                    description: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Delete a rule. Returns `false` if no rule had that id.
    pub fn remove(&self, id: i64) -> StorageResult<bool> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM rules WHERE id = ?1", params![id]))?;
        if removed > 0 {
            tracing::info!(rule_id = id, "Custom rule removed");
        }
        Ok(removed > 0)
    }
}
