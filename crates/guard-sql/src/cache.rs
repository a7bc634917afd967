// SPDX-License-Identifier: Apache-2.0

//! LRU cache of classified statements

use std::num::NonZeroUsize;
use std::sync::Arc;

use guard_core::ClassificationError;
use lru::LruCache;

use crate::statement::{classify, Statement};

const DEFAULT_CAPACITY: usize = 256;

/// Caches classification results by statement text
///
/// Applications tend to submit the same handful of statements over and over
/// with different parameters, so the lexer pass is skipped for repeats.
/// Failed classifications are not cached.
pub struct ClassifierCache {
    entries: LruCache<String, Arc<Statement>>,
    hits: u64,
    misses: u64,
}

impl ClassifierCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn classify(&mut self, sql: &str) -> Result<Arc<Statement>, ClassificationError> {
        if let Some(stmt) = self.entries.get(sql) {
            self.hits += 1;
            return Ok(Arc::clone(stmt));
        }
        self.misses += 1;
        let stmt = Arc::new(classify(sql)?);
        self.entries.put(sql.to_string(), Arc::clone(&stmt));
        Ok(stmt)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ClassifierCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::StatementKind;

    #[test]
    fn repeats_are_served_from_cache() {
        let mut cache = ClassifierCache::new(2);
        let first = cache.classify("DELETE FROM t WHERE id = ?").unwrap();
        let second = cache.classify("DELETE FROM t WHERE id = ?").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.kind(), StatementKind::Delete);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = ClassifierCache::new(2);
        cache.classify("SELECT 1").unwrap();
        cache.classify("SELECT 2").unwrap();
        cache.classify("SELECT 1").unwrap();
        cache.classify("SELECT 3").unwrap();
        assert_eq!(cache.len(), 2);
        cache.classify("SELECT 1").unwrap();
        assert_eq!(cache.stats(), (2, 3));
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache = ClassifierCache::default();
        assert!(cache.classify("SELECT 1; SELECT 2").is_err());
        assert!(cache.is_empty());
    }
}
