//! Trellis Runtime
//!
//! Hosts resident worlds over a shared resource cache and drives the active
//! one at a fixed tick rate:
//! - [`Driver`]: world residency, activation and switching
//! - [`Loop`]: fixed-step frame loop with frame metrics
//! - [`RuntimeConfig`]: JSON tunables

mod config;
mod driver;
mod run_loop;

use std::path::PathBuf;
use thiserror::Error;
use trellis_core::ecs::WorldId;

pub use config::{ConfigError, RuntimeConfig};
pub use driver::Driver;
pub use run_loop::{FrameOutcome, Loop, LoopSummary};

/// Error returned by a world factory.
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{id} is not resident")]
    UnknownWorld { id: WorldId },

    /// A restart was requested for a world that has no factory.
    #[error("{id} has no factory to rebuild it from")]
    NotRebuildable { id: WorldId },

    #[error("failed to build {id}")]
    Build {
        id: WorldId,
        #[source]
        source: BuildError,
    },

    #[error("no world is active")]
    NoActiveWorld,

    #[error("failed to load config from {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}
