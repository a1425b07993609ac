//! Fixed-step frame loop
//!
//! Each frame converts elapsed wall time into whole ticks of the active world.
//! A quit request ends the frame early; a switch request takes effect between
//! ticks, so the remaining ticks of that frame run on the new world.

use std::thread;
use std::time::{Duration, Instant};

use trellis_core::time::FixedStep;
use trellis_metrics::{Counters, FrameTimer};

use crate::{Driver, DriverError};

/// What a single frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOutcome {
    pub ticks: u32,
    pub failures: usize,
    pub quit: bool,
}

/// Totals over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSummary {
    pub frames: u64,
    pub ticks: u64,
    pub quit: bool,
}

pub struct Loop {
    driver: Driver,
    step: FixedStep,
    frame_timer: FrameTimer,
    counters: Counters,
}

impl Loop {
    pub fn new(driver: Driver) -> Self {
        let config = driver.config();
        let step = FixedStep::new(config.tick_rate_hz, config.max_frame_ticks);
        let frame_timer = FrameTimer::new(config.frame_samples.max(1));
        Self {
            driver,
            step,
            frame_timer,
            counters: Counters::new(),
        }
    }

    /// Run the ticks owed for `elapsed` wall time.
    pub fn run_frame(&mut self, elapsed: Duration) -> Result<FrameOutcome, DriverError> {
        self.frame_timer.begin();
        let owed = self.step.advance(elapsed);
        let dt = self.step.dt();
        let switches_before = self.driver.switches();

        let mut outcome = FrameOutcome::default();
        for _ in 0..owed {
            if self.driver.quit_requested() {
                break;
            }
            let report = self.driver.tick(dt)?;
            outcome.ticks += 1;
            outcome.failures += report.failures.len();
        }
        outcome.quit = self.driver.quit_requested();

        self.counters.increment("ticks", u64::from(outcome.ticks));
        self.counters.increment("processor_failures", outcome.failures as u64);
        self.counters
            .increment("switches", self.driver.switches() - switches_before);
        self.frame_timer.end();
        Ok(outcome)
    }

    /// Run up to `frames` frames of `frame_time` each, without sleeping.
    pub fn run_for(&mut self, frames: u64, frame_time: Duration) -> Result<LoopSummary, DriverError> {
        let mut summary = LoopSummary::default();
        for _ in 0..frames {
            let outcome = self.run_frame(frame_time)?;
            summary.frames += 1;
            summary.ticks += u64::from(outcome.ticks);
            if outcome.quit {
                summary.quit = true;
                break;
            }
        }
        Ok(summary)
    }

    /// Run in real time until quit (or until `max_frames`, when given).
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<LoopSummary, DriverError> {
        let mut summary = LoopSummary::default();
        let mut last = Instant::now();
        tracing::info!(hz = self.driver.config().tick_rate_hz, "loop started");

        while max_frames.map_or(true, |max| summary.frames < max) {
            let now = Instant::now();
            let outcome = self.run_frame(now - last)?;
            last = now;

            summary.frames += 1;
            summary.ticks += u64::from(outcome.ticks);
            if outcome.quit {
                summary.quit = true;
                break;
            }

            let spent = last.elapsed();
            if spent < self.step.step() {
                thread::sleep(self.step.step() - spent);
            }
        }

        tracing::info!(
            frames = summary.frames,
            ticks = summary.ticks,
            fps = self.frame_timer.fps(),
            "loop stopped"
        );
        Ok(summary)
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Driver {
        &mut self.driver
    }

    pub fn step(&self) -> &FixedStep {
        &self.step
    }

    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn into_driver(self) -> Driver {
        self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use trellis_core::ecs::{Processor, ProcessorError, World};

    #[derive(Default)]
    struct CountTicks(u32);

    impl Processor for CountTicks {
        fn update(&mut self, _world: &mut World, _dt: f32) -> Result<(), ProcessorError> {
            self.0 += 1;
            Ok(())
        }
    }

    fn ten_hz_loop() -> Loop {
        let config = RuntimeConfig {
            tick_rate_hz: 10,
            max_frame_ticks: 3,
            ..RuntimeConfig::default()
        };
        let mut driver = Driver::new(config);
        let id = driver.create_world("main");
        driver.world_mut(id).unwrap().add_processor(CountTicks::default(), 1);
        driver.activate(id).unwrap();
        Loop::new(driver)
    }

    #[test]
    fn frames_run_the_ticks_they_owe() {
        let mut game_loop = ten_hz_loop();

        assert_eq!(game_loop.run_frame(Duration::from_millis(50)).unwrap().ticks, 0);
        assert_eq!(game_loop.run_frame(Duration::from_millis(60)).unwrap().ticks, 1);
        // Capped at max_frame_ticks.
        assert_eq!(game_loop.run_frame(Duration::from_secs(2)).unwrap().ticks, 3);

        let ticks = game_loop
            .driver()
            .active_world()
            .and_then(|world| world.get_processor::<CountTicks>())
            .map(|counter| counter.0);
        assert_eq!(ticks, Some(4));
        assert_eq!(game_loop.counters().get("ticks"), 4);
    }

    #[test]
    fn run_for_without_quit_runs_every_frame() {
        let mut game_loop = ten_hz_loop();
        let summary = game_loop.run_for(5, Duration::from_millis(100)).unwrap();
        assert_eq!(summary, LoopSummary { frames: 5, ticks: 5, quit: false });
    }

    #[test]
    fn frame_fails_without_active_world() {
        let mut game_loop = Loop::new(Driver::default());
        let error = game_loop.run_frame(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(error, DriverError::NoActiveWorld));
    }
}
