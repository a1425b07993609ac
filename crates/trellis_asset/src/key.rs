use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a cached resource: where it lives and who decodes it.
///
/// Two handles share a cache entry exactly when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    path: String,
    loader_id: String,
}

impl ResourceKey {
    pub fn new(path: impl Into<String>, loader_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            loader_id: loader_id.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn loader_id(&self) -> &str {
        &self.loader_id
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.loader_id, self.path)
    }
}

/// How long an unheld cache entry survives.
///
/// Ordered from weakest to strongest; when handles disagree about a key the
/// strongest policy wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Evicted as soon as the last holder releases it.
    Ephemeral,
    /// Kept until the next world-transition sweep.
    #[default]
    Scene,
    /// Kept until explicitly evicted.
    Persistent,
}
