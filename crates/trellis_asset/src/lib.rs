//! Trellis Asset Cache
//!
//! Lazily resolved, shared resources:
//! - [`ResourceHandle`]: a reference that loads on first use
//! - [`ResourceCache`]: one loaded value per [`ResourceKey`], shared by every
//!   handle with that key, evicted according to [`Persistence`]
//! - [`ResourceMap`]: a `/`-addressed tree of resource specs, optionally
//!   populated by scanning a directory
//!
//! Decoding is delegated to [`Loader`] implementations supplied by the media
//! layer.

mod cache;
mod error;
mod handle;
mod key;
mod loader;
mod map;

pub use cache::{CacheStats, ResourceCache, SweepReport};
pub use error::ResourceError;
pub use handle::{HandleState, ResourceHandle};
pub use key::{Persistence, ResourceKey};
pub use loader::{FnLoader, LoadError, Loader};
pub use map::{ExtensionImporter, Importer, Node, ResourceMap, ResourceSpec, ScanOptions, SEPARATOR};
