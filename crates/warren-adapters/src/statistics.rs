//! Fire-and-forget statistics counters.
//!
//! Every silent drop in the datagram path bumps a named counter; nothing
//! in the core ever blocks on statistics.

use std::collections::HashMap;
use std::sync::Mutex;

/// A sink for named monotonic counters.
pub trait Statistics: Send + Sync {
    /// Add `delta` to the counter `name`.
    fn update(&self, name: &'static str, delta: u64);
}

/// Discards every update.
pub struct NoopStats;

impl Statistics for NoopStats {
    fn update(&self, _name: &'static str, _delta: u64) {}
}

/// Keeps counters in memory; tests read them back with [`MemoryStats::get`].
#[derive(Default)]
pub struct MemoryStats {
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`, zero if never updated.
    pub fn get(&self, name: &'static str) -> u64 {
        self.counters
            .lock()
            .map(|c| c.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Statistics for MemoryStats {
    fn update(&self, name: &'static str, delta: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name).or_insert(0) += delta;
        }
    }
}
