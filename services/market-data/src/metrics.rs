//! Generator service counters

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the book generator loop.
#[derive(Debug, Default)]
pub struct GeneratorMetrics {
    pub books_built: AtomicU64,
    pub markets_skipped: AtomicU64,
    pub publishes: AtomicU64,
    pub publishes_suppressed: AtomicU64,
    pub cache_writes: AtomicU64,
    pub cache_writes_suppressed: AtomicU64,
}

impl GeneratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_books_built(&self, count: u64) {
        self.books_built.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_market_skipped(&self) {
        self.markets_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self, published: bool) {
        if published {
            self.publishes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.publishes_suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_write(&self, written: bool) {
        if written {
            self.cache_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_writes_suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("books_built".to_string(), self.books_built.load(Ordering::Relaxed));
        m.insert("markets_skipped".to_string(), self.markets_skipped.load(Ordering::Relaxed));
        m.insert("publishes".to_string(), self.publishes.load(Ordering::Relaxed));
        m.insert(
            "publishes_suppressed".to_string(),
            self.publishes_suppressed.load(Ordering::Relaxed),
        );
        m.insert("cache_writes".to_string(), self.cache_writes.load(Ordering::Relaxed));
        m.insert(
            "cache_writes_suppressed".to_string(),
            self.cache_writes_suppressed.load(Ordering::Relaxed),
        );
        m
    }
}
