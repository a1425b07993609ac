//! Named monotonic counters (ticks, failures, world switches)

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Counters {
    counters: BTreeMap<&'static str, u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, name: &'static str, value: u64) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    /// Sorted by name, so log lines come out in a stable order.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.counters.iter().map(|(k, v)| (*k, *v)).collect()
    }
}
