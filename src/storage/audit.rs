//! Append-only audit log of pipeline decisions.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{Database, StorageResult};

/// Final outcome of one processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allowed,
    Blocked,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String,
    pub ip: String,
    pub method: String,
    pub path: String,
    pub body: String,
    pub status: String,
    pub reason: String,
}

/// Aggregates over the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Count per non-empty reason.
    pub attacks: BTreeMap<String, u64>,
    /// Count per outcome.
    pub status: BTreeMap<String, u64>,
}

/// Writer and reader for the `logs` table.
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one entry stamped with the current time. Returns its id.
    pub fn record(
        &self,
        ip: &str,
        method: &str,
        path: &str,
        body: &str,
        outcome: Outcome,
        reason: &str,
    ) -> StorageResult<i64> {
        self.record_at(Utc::now(), ip, method, path, body, outcome, reason)
    }

    /// Append one entry stamped with `at`, typically when the request arrived.
    #[allow(clippy::too_many_arguments)]
    pub fn record_at(
        &self,
        at: DateTime<Utc>,
        ip: &str,
        method: &str,
        path: &str,
        body: &str,
        outcome: Outcome,
        reason: &str,
    ) -> StorageResult<i64> {
        let timestamp = at.to_rfc3339_opts(SecondsFormat::Micros, true);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO logs (timestamp, ip, method, path, body, status, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![timestamp, ip, method, path, body, outcome.as_str(), reason],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest entries first.
    pub fn recent(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, ip, method, path, body, status, reason
                 FROM logs ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    ip: row.get(2)?,
                    method: row.get(3)?,
                    path: row.get(4)?,
                    body: row.get(5)?,
                    status: row.get(6)?,
                    reason: row.get(7)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Counts by reason (non-empty only) and by outcome.
    pub fn stats(&self) -> StorageResult<AuditStats> {
        self.db.with_conn(|conn| {
            let mut stats = AuditStats::default();

            let mut stmt =
                conn.prepare("SELECT reason, COUNT(*) FROM logs WHERE reason != '' GROUP BY reason")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (reason, count) = row?;
                stats.attacks.insert(reason, count as u64);
            }

            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM logs GROUP BY status")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (status, count) = row?;
                stats.status.insert(status, count as u64);
            }

            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> AuditLog {
        Database::open_in_memory().unwrap().audit()
    }

    #[test]
    fn test_record_and_read_back() {
        let audit = log();
        let id = audit
            .record("10.1.1.1", "POST", "/login", "user=a", Outcome::Allowed, "")
            .unwrap();

        let entries = audit.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, id);
        assert_eq!(entry.ip, "10.1.1.1");
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.path, "/login");
        assert_eq!(entry.body, "user=a");
        assert_eq!(entry.status, "allowed");
        assert_eq!(entry.reason, "");
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let audit = log();
        for i in 0..5 {
            audit
                .record("10.1.1.1", "GET", &format!("/{}", i), "", Outcome::Allowed, "")
                .unwrap();
        }

        let entries = audit.recent(3).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/4", "/3", "/2"]);
    }

    #[test]
    fn test_stats() {
        let audit = log();
        audit.record("a", "GET", "/", "", Outcome::Allowed, "").unwrap();
        audit.record("b", "GET", "/", "", Outcome::Blocked, "blacklisted").unwrap();
        audit.record("b", "GET", "/", "", Outcome::Blocked, "blacklisted").unwrap();
        audit
            .record("c", "GET", "/", "", Outcome::Blocked, "malicious: xss")
            .unwrap();

        let stats = audit.stats().unwrap();
        assert_eq!(stats.attacks.get("blacklisted"), Some(&2));
        assert_eq!(stats.attacks.get("malicious: xss"), Some(&1));
        assert_eq!(stats.attacks.len(), 2);
        assert_eq!(stats.status.get("allowed"), Some(&1));
        assert_eq!(stats.status.get("blocked"), Some(&3));
    }

    #[test]
    fn test_record_at_keeps_arrival_time() {
        let audit = log();
        let arrived = chrono::DateTime::parse_from_rfc3339("2024-03-01T12:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        audit
            .record_at(arrived, "10.1.1.1", "GET", "/", "", Outcome::Allowed, "")
            .unwrap();

        let entry = &audit.recent(1).unwrap()[0];
        assert_eq!(entry.timestamp, "2024-03-01T12:00:00.250000Z");
    }
}
