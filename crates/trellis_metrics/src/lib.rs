//! Trellis Metrics - frame and processor instrumentation
//!
//! Small, allocation-light metrics used by the scheduler and the run loop.
//! Everything here vanishes in production builds via the `metrics` feature.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use trellis_metrics::{FrameTimer, ProcessorProfiler};
//!
//! let mut timer = FrameTimer::new(60); // Track last 60 frames
//! let mut profiler = ProcessorProfiler::new();
//! timer.begin();
//! profiler.time("movement", || world_step());
//! timer.end();
//! println!("FPS: {:.1}", timer.fps());
//! ```
//!
//! Without the `metrics` feature every type below is a zero-sized stub with
//! the same method names, so call sites never need their own `cfg`.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod frame_timer;
#[cfg(feature = "metrics")]
mod processor_profiler;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counters;
#[cfg(feature = "metrics")]
pub use frame_timer::FrameTimer;
#[cfg(feature = "metrics")]
pub use processor_profiler::{ProcessorProfiler, ProcessorTiming};
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

/// Whether this build collects metrics.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct FrameTimer;

#[cfg(not(feature = "metrics"))]
impl FrameTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) {}
    pub fn frames(&self) -> u64 { 0 }
    pub fn fps(&self) -> f64 { 0.0 }
    pub fn frame_time_ms(&self) -> f64 { 0.0 }
    pub fn frame_time_range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counters;

#[cfg(not(feature = "metrics"))]
impl Counters {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorTiming {
    pub samples: u32,
    pub total: std::time::Duration,
    pub last: std::time::Duration,
}

#[cfg(not(feature = "metrics"))]
impl ProcessorTiming {
    pub fn average(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct ProcessorProfiler;

#[cfg(not(feature = "metrics"))]
impl ProcessorProfiler {
    pub fn new() -> Self { Self }
    pub fn time<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn record(&mut self, _name: &str, _elapsed: std::time::Duration) {}
    pub fn timing(&self, _name: &str) -> ProcessorTiming { ProcessorTiming::default() }
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessorTiming)> { std::iter::empty() }
}
