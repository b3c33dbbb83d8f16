//! Long-term tier — append-only analysis history in SQLite.
//!
//! Records are never updated or deleted; trend queries rely on the full
//! history per fingerprint staying intact. Lookup tries an exact fingerprint
//! match first, then falls back to a similarity scan over a bounded window of
//! the most recent distinct fingerprints.

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::MemoryError;
use crate::memory::types::MemoryRecord;

/// Read/write interface of the long-term tier.
pub trait LongTermStore: Send + Sync {
    /// Append a record. Never overwrites prior history.
    fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError>;

    /// Most recent record with exactly this fingerprint.
    fn find_exact(&self, fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    /// Most recent record whose fingerprint is similar to this one.
    fn find_similar(&self, fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError>;

    /// Full history for a fingerprint, most recent first.
    fn history(&self, fingerprint: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError>;
}

/// SQLite-backed long-term store over the shared connection.
pub struct SqliteLongTermStore {
    db: Arc<Mutex<Connection>>,
    similarity_threshold: f64,
    similarity_window: usize,
}

impl SqliteLongTermStore {
    pub fn new(db: Arc<Mutex<Connection>>, similarity_threshold: f64, similarity_window: usize) -> Self {
        Self {
            db,
            similarity_threshold,
            similarity_window,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MemoryError> {
        self.db
            .lock()
            .map_err(|_| MemoryError::LongTerm("db lock poisoned".into()))
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<MemoryRecord> {
    let recommendation: String = row.get(5)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        product_title: row.get(2)?,
        price: row.get(3)?,
        analysis: row.get(4)?,
        recommendation: recommendation
            .parse()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        created_at: row.get(6)?,
    })
}

const RECORD_COLUMNS: &str =
    "id, fingerprint, product_title, price, analysis, recommendation, created_at";

impl LongTermStore for SqliteLongTermStore {
    fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memories (id, fingerprint, product_title, price, analysis, recommendation, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.fingerprint,
                record.product_title,
                record.price,
                record.analysis,
                record.recommendation.as_str(),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn find_exact(&self, fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM memories WHERE fingerprint = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![fingerprint], record_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn find_similar(&self, fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        // Candidate fingerprints, most recently seen first.
        let candidates: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT fingerprint, MAX(created_at) AS last_seen FROM memories \
                 GROUP BY fingerprint ORDER BY last_seen DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![self.similarity_window as i64], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        // First qualifying candidate in recency order wins: callers get the
        // most recent matching record, not the closest one.
        for candidate in candidates {
            let sim = normalized_similarity(fingerprint, &candidate);
            if sim >= self.similarity_threshold {
                debug!(query = fingerprint, matched = %candidate, similarity = sim, "similar fingerprint");
                return self.find_exact(&candidate);
            }
        }

        Ok(None)
    }

    fn history(&self, fingerprint: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM memories WHERE fingerprint = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![fingerprint, limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Normalized Levenshtein similarity in [0, 1].
///
/// 1.0 means identical; 0.0 means nothing in common at max edit distance.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Classic two-row Levenshtein distance over chars.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::types::Recommendation;

    fn test_store() -> SqliteLongTermStore {
        let conn = db::open_memory_database().unwrap();
        SqliteLongTermStore::new(Arc::new(Mutex::new(conn)), 0.82, 200)
    }

    fn record(fingerprint: &str, title: &str) -> MemoryRecord {
        MemoryRecord::new(fingerprint, title, 42.99, "analysis text", Recommendation::Buy)
    }

    #[test]
    fn append_then_find_exact() {
        let store = test_store();
        store.append(&record("wireless earbuds under 50", "X Earbuds")).unwrap();

        let found = store.find_exact("wireless earbuds under 50").unwrap().unwrap();
        assert_eq!(found.product_title, "X Earbuds");
        assert!(store.find_exact("yoga mat").unwrap().is_none());
    }

    #[test]
    fn find_exact_returns_most_recent() {
        let store = test_store();
        let mut old = record("yoga mat", "Old Mat");
        old.created_at = "2026-01-01T00:00:00+00:00".into();
        store.append(&old).unwrap();
        let mut new = record("yoga mat", "New Mat");
        new.created_at = "2026-06-01T00:00:00+00:00".into();
        store.append(&new).unwrap();

        let found = store.find_exact("yoga mat").unwrap().unwrap();
        assert_eq!(found.product_title, "New Mat");
    }

    #[test]
    fn append_is_append_only() {
        let store = test_store();
        let first = record("yoga mat", "Old Mat");
        store.append(&first).unwrap();
        store.append(&record("yoga mat", "New Mat")).unwrap();

        // Prior record is still there, unchanged
        let history = store.history("yoga mat", 10).unwrap();
        assert_eq!(history.len(), 2);
        let old = history.iter().find(|r| r.id == first.id).unwrap();
        assert_eq!(old.product_title, "Old Mat");
    }

    #[test]
    fn find_similar_matches_close_fingerprint() {
        let store = test_store();
        store.append(&record("wireless earbuds under 50", "X Earbuds")).unwrap();

        // One-word variant: "earbud" vs "earbuds"
        let found = store.find_similar("wireless earbud under 50").unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().product_title, "X Earbuds");
    }

    #[test]
    fn find_similar_rejects_distant_fingerprint() {
        let store = test_store();
        store.append(&record("wireless earbuds under 50", "X Earbuds")).unwrap();

        assert!(store.find_similar("ergonomic office chair").unwrap().is_none());
    }

    #[test]
    fn history_is_most_recent_first() {
        let store = test_store();
        for (i, title) in ["First", "Second", "Third"].iter().enumerate() {
            let mut rec = record("yoga mat", title);
            rec.created_at = format!("2026-0{}-01T00:00:00+00:00", i + 1);
            store.append(&rec).unwrap();
        }

        let history = store.history("yoga mat", 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].product_title, "Third");
        assert_eq!(history[1].product_title, "Second");
    }

    #[test]
    fn similarity_metric_bounds() {
        assert!((normalized_similarity("abc", "abc") - 1.0).abs() < 1e-9);
        assert!((normalized_similarity("", "") - 1.0).abs() < 1e-9);
        assert!(normalized_similarity("abc", "xyz") < 0.01);
        // Single-char edit on a long string stays close to 1
        assert!(normalized_similarity("wireless earbuds", "wireless earbud") > 0.9);
    }
}
