use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-lifetime counters, mirroring the original implementation's
/// `state_compress_t` bookkeeping fields. Every field is an independent
/// atomic so workers can update them without taking the table mutex.
#[derive(Default)]
pub struct Stats {
    pub large_hits: AtomicU64,
    pub small_hits: AtomicU64,
    pub stored_as_literals: AtomicU64,
    pub literals_compressed_size: AtomicU64,
    pub high_entropy_bytes: AtomicU64,
    pub congested_small: AtomicU64,
    pub congested_large: AtomicU64,
    pub anomalies_small: AtomicU64,
    pub anomalies_large: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            large_hits: self.large_hits.load(Ordering::Relaxed),
            small_hits: self.small_hits.load(Ordering::Relaxed),
            stored_as_literals: self.stored_as_literals.load(Ordering::Relaxed),
            literals_compressed_size: self.literals_compressed_size.load(Ordering::Relaxed),
            high_entropy_bytes: self.high_entropy_bytes.load(Ordering::Relaxed),
            congested_small: self.congested_small.load(Ordering::Relaxed),
            congested_large: self.congested_large.load(Ordering::Relaxed),
            anomalies_small: self.anomalies_small.load(Ordering::Relaxed),
            anomalies_large: self.anomalies_large.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data copy of `Stats`, cheap to hand out to callers (UI/CLI).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub large_hits: u64,
    pub small_hits: u64,
    pub stored_as_literals: u64,
    pub literals_compressed_size: u64,
    pub high_entropy_bytes: u64,
    pub congested_small: u64,
    pub congested_large: u64,
    pub anomalies_small: u64,
    pub anomalies_large: u64,
}
