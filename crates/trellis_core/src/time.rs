//! Fixed-step simulation time
//!
//! Wall-clock frame time is accumulated and converted into whole simulation
//! ticks of a fixed length (60 Hz by default). The remainder carries over to
//! the next frame; `alpha` exposes it for render interpolation.

use std::time::Duration;

/// Default simulation tick rate (60 Hz = 16.666ms per tick)
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

/// Fixed-step accumulator.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    accumulated: Duration,
    max_ticks: u32,
    tick_count: u64,
}

impl FixedStep {
    /// `max_ticks` caps the ticks produced by a single `advance`, so a long
    /// stall does not snowball into a burst of catch-up ticks.
    pub fn new(tick_rate_hz: u32, max_ticks: u32) -> Self {
        let hz = tick_rate_hz.max(1);
        Self {
            step: Duration::from_secs_f64(1.0 / f64::from(hz)),
            accumulated: Duration::ZERO,
            max_ticks: max_ticks.max(1),
            tick_count: 0,
        }
    }

    /// Add elapsed wall time and return how many ticks to run now.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulated += elapsed;

        let mut ticks = 0;
        while self.accumulated >= self.step && ticks < self.max_ticks {
            self.accumulated -= self.step;
            ticks += 1;
        }
        if ticks == self.max_ticks && self.accumulated >= self.step {
            tracing::trace!(dropped = ?self.accumulated, "fixed step fell behind, dropping backlog");
            self.accumulated = Duration::ZERO;
        }

        self.tick_count += u64::from(ticks);
        ticks
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Tick length in seconds, as passed to `World::tick`.
    pub fn dt(&self) -> f32 {
        self.step.as_secs_f32()
    }

    /// Fraction of a tick left in the accumulator, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        (self.accumulated.as_secs_f64() / self.step.as_secs_f64()) as f32
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Simulated time covered by all ticks produced so far.
    pub fn total_time(&self) -> Duration {
        self.step * self.tick_count.min(u64::from(u32::MAX)) as u32
    }
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE_HZ, 5)
    }
}
