//! Keyed pattern store (C9, supporting C7): patterns are a genuinely keyed,
//! queryable store rather than an append-only log, so they are backed by
//! `rusqlite` — reusing the teacher's `SqliteMemoryStore::with_conn`
//! single-lock-around-every-call shape — instead of the JSONL event log.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::patterns::Pattern;

pub struct PatternStore {
    conn: Arc<Mutex<Connection>>,
}

impl PatternStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::persistence(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::persistence(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                framework TEXT NOT NULL,
                scenario_ids TEXT NOT NULL,
                representative_tokens TEXT NOT NULL,
                count INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::persistence(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_patterns_category_framework
             ON patterns(category, framework)",
            [],
        )
        .map_err(|e| Error::persistence(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::internal(format!("pattern store lock poisoned: {e}")))?;
        f(&conn).map_err(|e| Error::persistence(e.to_string()))
    }

    /// Insert or replace a pattern row, keyed by its id. Re-observing an
    /// existing pattern overwrites its count rather than creating a
    /// duplicate row, matching the in-memory learner's own semantics.
    pub fn upsert(&self, pattern: &Pattern) -> Result<()> {
        let scenario_ids = serde_json::to_string(&pattern.scenario_ids)?;
        let tokens = serde_json::to_string(&pattern.representative_tokens)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO patterns (id, category, framework, scenario_ids, representative_tokens, count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    scenario_ids = excluded.scenario_ids,
                    representative_tokens = excluded.representative_tokens,
                    count = excluded.count",
                params![
                    pattern.id,
                    pattern.category,
                    pattern.framework,
                    scenario_ids,
                    tokens,
                    pattern.count,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Pattern>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, category, framework, scenario_ids, representative_tokens, count
                 FROM patterns WHERE id = ?1",
                params![id],
                Self::row_to_pattern,
            )
            .optional()
        })
    }

    /// Patterns sharing `category` and `framework`, the index the bandit
    /// scheduler and C7's clustering both query by.
    pub fn by_category_framework(&self, category: &str, framework: &str) -> Result<Vec<Pattern>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, category, framework, scenario_ids, representative_tokens, count
                 FROM patterns WHERE category = ?1 AND framework = ?2",
            )?;
            let rows = stmt
                .query_map(params![category, framework], Self::row_to_pattern)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Every persisted pattern, used to rehydrate `PatternLearner` on
    /// flywheel resume.
    pub fn all(&self) -> Result<Vec<Pattern>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, category, framework, scenario_ids, representative_tokens, count
                 FROM patterns",
            )?;
            let rows = stmt
                .query_map([], Self::row_to_pattern)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn row_to_pattern(row: &rusqlite::Row) -> rusqlite::Result<Pattern> {
        let scenario_ids: String = row.get(3)?;
        let tokens: String = row.get(4)?;
        Ok(Pattern {
            id: row.get(0)?,
            category: row.get(1)?,
            framework: row.get(2)?,
            scenario_ids: serde_json::from_str(&scenario_ids).unwrap_or_default(),
            representative_tokens: serde_json::from_str(&tokens).unwrap_or_default(),
            count: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, count: u32) -> Pattern {
        Pattern {
            id: id.to_string(),
            category: "pii".to_string(),
            framework: "generic".to_string(),
            scenario_ids: vec!["fin_001".to_string()],
            representative_tokens: vec!["ssn".to_string()],
            count,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = PatternStore::in_memory().unwrap();
        store.upsert(&sample("p1", 1)).unwrap();
        let fetched = store.get("p1").unwrap().unwrap();
        assert_eq!(fetched.count, 1);
        assert_eq!(fetched.scenario_ids, vec!["fin_001".to_string()]);
    }

    #[test]
    fn repeated_upsert_overwrites_rather_than_duplicates() {
        let store = PatternStore::in_memory().unwrap();
        store.upsert(&sample("p1", 1)).unwrap();
        store.upsert(&sample("p1", 2)).unwrap();
        assert_eq!(store.by_category_framework("pii", "generic").unwrap().len(), 1);
        assert_eq!(store.get("p1").unwrap().unwrap().count, 2);
    }

    #[test]
    fn all_returns_every_persisted_pattern() {
        let store = PatternStore::in_memory().unwrap();
        store.upsert(&sample("p1", 1)).unwrap();
        store.upsert(&sample("p2", 3)).unwrap();
        let mut ids: Vec<String> = store.all().unwrap().into_iter().map(|p| p.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }
}
