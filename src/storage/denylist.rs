//! Denylist of banned source addresses.
//!
//! Entries have no expiry; an address stays banned until removed through
//! the admin API.

use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension};

use super::{Database, StorageResult};

/// Durable set of denylisted source addresses.
#[derive(Clone)]
pub struct DenylistStore {
    db: Database,
}

impl DenylistStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Check whether `address` is denylisted.
    pub fn contains(&self, address: &str) -> StorageResult<bool> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT 1 FROM denylist WHERE ip = ?1",
                params![address],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
    }

    /// Add `address`. Returns `false` if it was already present.
    pub fn add(&self, address: &str) -> StorageResult<bool> {
        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO denylist (ip) VALUES (?1)",
                params![address],
            )
        })?;
        if inserted > 0 {
            tracing::info!(address = %address, "Address denylisted");
        }
        Ok(inserted > 0)
    }

    /// Remove `address`. Returns `false` if it was not present.
    pub fn remove(&self, address: &str) -> StorageResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM denylist WHERE ip = ?1", params![address])
        })?;
        if removed > 0 {
            tracing::info!(address = %address, "Address removed from denylist");
        }
        Ok(removed > 0)
    }

    /// All denylisted addresses.
    pub fn list(&self) -> StorageResult<BTreeSet<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT ip FROM denylist ORDER BY ip")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DenylistStore {
        Database::open_in_memory().unwrap().denylist()
    }

    #[test]
    fn test_add_is_idempotent() {
        let denylist = store();
        assert!(denylist.add("10.0.0.1").unwrap());
        assert!(!denylist.add("10.0.0.1").unwrap());
        assert_eq!(denylist.list().unwrap().len(), 1);
        assert!(denylist.contains("10.0.0.1").unwrap());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let denylist = store();
        assert!(!denylist.remove("10.0.0.2").unwrap());

        denylist.add("10.0.0.2").unwrap();
        assert!(denylist.remove("10.0.0.2").unwrap());
        assert!(!denylist.contains("10.0.0.2").unwrap());
    }

    #[test]
    fn test_hostile_input_is_plain_data() {
        let denylist = store();
        let hostile = "1.2.3.4' OR '1'='1";
        denylist.add("10.0.0.3").unwrap();

        assert!(!denylist.contains(hostile).unwrap());
        denylist.add(hostile).unwrap();
        assert!(denylist.contains(hostile).unwrap());
        assert!(denylist.remove(hostile).unwrap());

        let listed = denylist.list().unwrap();
        assert_eq!(listed.into_iter().collect::<Vec<_>>(), vec!["10.0.0.3".to_string()]);
    }

    #[test]
    fn test_concurrent_add_remove_same_key() {
        let denylist = store();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let denylist = denylist.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            denylist.add("192.0.2.1").unwrap();
                        } else {
                            denylist.remove("192.0.2.1").unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let listed = denylist.list().unwrap();
        assert!(listed.len() <= 1);
        denylist.add("192.0.2.1").unwrap();
        assert_eq!(denylist.list().unwrap().len(), 1);
    }
}
