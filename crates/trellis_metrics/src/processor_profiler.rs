//! Per-processor update timings

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulated timing for one processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorTiming {
    pub samples: u32,
    pub total: Duration,
    pub last: Duration,
}

impl ProcessorTiming {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessorProfiler {
    timings: HashMap<String, ProcessorTiming>,
}

impl ProcessorProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
        }
    }

    pub fn time<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        let entry = self.timings.entry(name.to_string()).or_default();
        entry.samples = entry.samples.saturating_add(1);
        entry.total += elapsed;
        entry.last = elapsed;
    }

    pub fn timing(&self, name: &str) -> ProcessorTiming {
        self.timings.get(name).copied().unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessorTiming)> {
        self.timings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_samples_per_name() {
        let mut profiler = ProcessorProfiler::new();
        profiler.record("movement", Duration::from_millis(2));
        profiler.record("movement", Duration::from_millis(4));

        let timing = profiler.timing("movement");
        assert_eq!(timing.samples, 2);
        assert_eq!(timing.last, Duration::from_millis(4));
        assert_eq!(timing.average(), Duration::from_millis(3));
        assert_eq!(profiler.timing("unknown").samples, 0);
    }
}
