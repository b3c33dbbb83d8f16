//! Short-term tier — bounded in-process cache of recent analyses.
//!
//! Entries live for the session only: the cache holds at most `capacity`
//! records, evicting the oldest insertion when full, and treats entries older
//! than the TTL as expired on read. A write for an existing fingerprint
//! replaces the prior entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::MemoryError;
use crate::memory::types::MemoryRecord;

/// Read/write interface of the short-term tier.
pub trait ShortTermStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError>;
    fn put(&self, record: MemoryRecord) -> Result<(), MemoryError>;
}

struct CacheEntry {
    record: MemoryRecord,
    stored_at: DateTime<Utc>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order, oldest first. Re-inserting a fingerprint moves it to
    /// the back.
    order: VecDeque<String>,
}

/// Bounded recency-window cache keyed by fingerprint.
pub struct RecentCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl RecentCache {
    pub fn new(capacity: usize, ttl_minutes: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            ttl: Duration::minutes(ttl_minutes as i64),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ShortTermStore for RecentCache {
    fn get(&self, fingerprint: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| MemoryError::ShortTerm("cache lock poisoned".into()))?;

        let expired = match inner.entries.get(fingerprint) {
            None => return Ok(None),
            Some(entry) => Utc::now() - entry.stored_at > self.ttl,
        };

        if expired {
            inner.entries.remove(fingerprint);
            inner.order.retain(|k| k != fingerprint);
            return Ok(None);
        }

        Ok(inner.entries.get(fingerprint).map(|e| e.record.clone()))
    }

    fn put(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| MemoryError::ShortTerm("cache lock poisoned".into()))?;

        let key = record.fingerprint.clone();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                record,
                stored_at: Utc::now(),
            },
        );

        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }

        Ok(())
    }
}
