use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total_udp: Counter,
    pub requests_total_tcp: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub upstream_failures: Counter,
    pub resolve_time: Histogram,
}

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counts durations in power-of-two nanosecond buckets.
#[derive(Debug, Default)]
pub struct Histogram {
    pub buckets: RwLock<HashMap<u32, Counter>>,
}

impl Histogram {
    pub fn insert(&self, value: Duration) {
        let bucket = value.as_nanos().max(1).ilog2();

        let buckets = self.buckets.read();
        if let Some(counter) = buckets.get(&bucket) {
            counter.inc();
            return;
        }

        drop(buckets);
        let mut buckets = self.buckets.write();
        buckets.entry(bucket).or_default().inc();
    }
}
