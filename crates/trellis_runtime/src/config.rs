use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::DriverError;

/// Runtime tunables, read from JSON. Missing fields take their defaults.
///
/// ```json
/// { "tick_rate_hz": 30, "max_entities": 10000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Fixed simulation rate.
    pub tick_rate_hz: u32,
    /// Most ticks a single frame may run while catching up.
    pub max_frame_ticks: u32,
    /// Priority of the controller pass in worlds created by the driver.
    pub controller_priority: i32,
    /// Entity slot limit for worlds created by the driver (`None` = unbounded).
    pub max_entities: Option<u32>,
    /// Frames kept by the frame timer.
    pub frame_samples: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: trellis_core::time::DEFAULT_TICK_RATE_HZ,
            max_frame_ticks: 5,
            controller_priority: 0,
            max_entities: None,
            frame_samples: 120,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read file")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON")]
    Json(#[from] serde_json::Error),
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let wrap = |source: ConfigError| DriverError::Config {
            path: path.to_path_buf(),
            source,
        };

        let text = fs::read_to_string(path).map_err(|error| wrap(error.into()))?;
        let config = Self::from_json(&text).map_err(|error| wrap(error.into()))?;
        tracing::debug!(path = %path.display(), ?config, "runtime config loaded");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
