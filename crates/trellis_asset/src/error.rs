use crate::{LoadError, ResourceKey};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving, mapping or scanning resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The loader failed. Nothing was cached, so resolving again retries.
    #[error("failed to load {key}: {source}")]
    LoadFailed {
        key: ResourceKey,
        #[source]
        source: LoadError,
    },

    #[error("{key} is cached as a different type than '{expected}'")]
    TypeMismatch {
        key: ResourceKey,
        expected: &'static str,
    },

    /// The loader for `key` tried to resolve `key` again on the same thread.
    #[error("cyclic load of {key}")]
    CyclicLoad { key: ResourceKey },

    #[error("no resource at '{path}'")]
    UnknownPath { path: String },

    #[error("failed to scan '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResourceError {
    /// Whether resolving again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LoadFailed { .. })
    }
}
