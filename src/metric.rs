use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

lazy_static! {
    pub static ref METRICS: Metric = Metric::default();
}

// process wide counters. names are fixed: downstream monitoring scrapes them.
#[derive(Clone, Debug, Default)]
pub struct Metric {
    pub memtable_flush_total: Arc<AtomicU64>,
    pub memtable_flush_duration_us: Arc<AtomicU64>,
}

impl Metric {
    pub fn incr_flush_total(&self) {
        self.memtable_flush_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_flush_duration_us(&self, us: u64) {
        self.memtable_flush_duration_us.fetch_add(us, Ordering::Relaxed);
    }

    pub fn flush_total(&self) -> u64 {
        self.memtable_flush_total.load(Ordering::Relaxed)
    }

    pub fn flush_duration_us(&self) -> u64 {
        self.memtable_flush_duration_us.load(Ordering::Relaxed)
    }
}
