// loader.rs - The seam between the cache and the media layer
//
// The cache never decodes anything itself. A `Loader` turns a path into a
// value and may release whatever backing resources that value holds once the
// cache evicts it.

use std::fmt;

/// Error produced by a loader.
pub type LoadError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub trait Loader: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Stable identifier; part of every key this loader resolves.
    fn id(&self) -> &str;

    fn load(&self, path: &str) -> Result<Self::Output, LoadError>;

    /// Called once for each value the cache evicts.
    fn release(&self, value: &Self::Output) {
        let _ = value;
    }
}

type ReleaseFn<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Loader built from closures.
pub struct FnLoader<T, F> {
    id: String,
    load: F,
    release: Option<ReleaseFn<T>>,
}

impl<T, F> FnLoader<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(&str) -> Result<T, LoadError> + Send + Sync + 'static,
{
    pub fn new(id: impl Into<String>, load: F) -> Self {
        Self {
            id: id.into(),
            load,
            release: None,
        }
    }

    pub fn with_release(mut self, release: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }
}

impl<T, F> Loader for FnLoader<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(&str) -> Result<T, LoadError> + Send + Sync + 'static,
{
    type Output = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self, path: &str) -> Result<T, LoadError> {
        (self.load)(path)
    }

    fn release(&self, value: &T) {
        if let Some(release) = &self.release {
            release(value);
        }
    }
}

impl<T, F> fmt::Debug for FnLoader<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader")
            .field("id", &self.id)
            .field("release", &self.release.is_some())
            .finish()
    }
}
