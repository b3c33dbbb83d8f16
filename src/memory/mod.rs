//! Tiered analysis memory: short-term cache in front of the append-only
//! long-term history.
//!
//! [`TieredMemory`] is the single surface the worker talks to. `recall`
//! consults the short-term tier first, then the long-term tier (exact
//! fingerprint, then similarity fallback). `remember` writes through to both
//! tiers with asymmetric failure handling: the cache is best-effort, the
//! history is not.

pub mod long_term;
pub mod short_term;
pub mod types;

use tracing::{debug, warn};

use crate::error::MemoryError;
use long_term::LongTermStore;
use short_term::ShortTermStore;
use types::{fingerprint, MemoryRecord};

/// Two-tier memory façade. Either tier can be swapped without touching the
/// worker.
pub struct TieredMemory {
    short: Box<dyn ShortTermStore>,
    long: Box<dyn LongTermStore>,
}

impl TieredMemory {
    pub fn new(short: Box<dyn ShortTermStore>, long: Box<dyn LongTermStore>) -> Self {
        Self { short, long }
    }

    /// Look up the most recent prior analysis for a query.
    ///
    /// Short-term tier first; a cache failure degrades to a miss. Long-term
    /// lookup tries the exact fingerprint, then the similarity fallback.
    pub fn recall(&self, query: &str) -> Result<Option<MemoryRecord>, MemoryError> {
        let key = fingerprint(query);
        if key.is_empty() {
            return Ok(None);
        }

        match self.short.get(&key) {
            Ok(Some(record)) => {
                debug!(fingerprint = %key, "short-term hit");
                return Ok(Some(record));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "short-term read failed, falling through"),
        }

        if let Some(record) = self.long.find_exact(&key)? {
            debug!(fingerprint = %key, "long-term exact hit");
            return Ok(Some(record));
        }

        self.long.find_similar(&key)
    }

    /// Write an analysis to both tiers.
    ///
    /// The short-term write is best-effort: a failure is logged and the
    /// record still reaches the long-term tier. A long-term failure is
    /// returned to the caller — history is part of the result, and the task
    /// must not complete without it.
    pub fn remember(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        self.long.append(&record)?;

        if let Err(e) = self.short.put(record) {
            warn!(error = %e, "short-term write failed, analysis proceeds uncached");
        }

        Ok(())
    }

    /// Long-term history for a query, most recent first.
    pub fn history(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.long.history(&fingerprint(query), limit)
    }
}
