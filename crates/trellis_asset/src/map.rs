//! Hierarchical resource map
//!
//! A tree of named resource specs addressed by `/`-separated paths
//! (`"sprites/hero/idle"`). Specs only describe how to load something; a
//! [`ResourceHandle`] is minted from a spec on demand against a cache.
//!
//! [`ResourceMap::scan`] populates a map from a directory tree: every file is
//! offered to the importers in order and the first one that accepts it
//! decides how it is loaded.

use crate::{Loader, Persistence, ResourceCache, ResourceError, ResourceHandle};
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

pub const SEPARATOR: char = '/';

/// How to load one resource.
#[derive(Clone)]
pub struct ResourceSpec {
    path: String,
    loader_id: String,
    output: &'static str,
    loader: Arc<dyn Any + Send + Sync>, // holds an `Arc<dyn Loader<Output = T>>`
    persistence: Persistence,
}

impl ResourceSpec {
    pub fn new<L: Loader>(path: impl Into<String>, loader: Arc<L>, persistence: Persistence) -> Self {
        let loader_id = loader.id().to_string();
        let erased: Arc<dyn Loader<Output = L::Output>> = loader;
        Self {
            path: path.into(),
            loader_id,
            output: type_name::<L::Output>(),
            loader: Arc::new(erased),
            persistence,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn loader_id(&self) -> &str {
        &self.loader_id
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Mint a handle, checking that the spec's loader produces `T`.
    pub fn handle<T: Send + Sync + 'static>(&self, cache: &ResourceCache) -> Result<ResourceHandle<T>, ResourceError> {
        let loader = self
            .loader
            .downcast_ref::<Arc<dyn Loader<Output = T>>>()
            .ok_or_else(|| ResourceError::TypeMismatch {
                key: crate::ResourceKey::new(self.path.clone(), self.loader_id.clone()),
                expected: type_name::<T>(),
            })?;
        Ok(ResourceHandle::from_dyn(
            cache.clone(),
            self.path.clone(),
            Arc::clone(loader),
            self.persistence,
        ))
    }
}

impl fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSpec")
            .field("path", &self.path)
            .field("loader_id", &self.loader_id)
            .field("output", &self.output)
            .field("persistence", &self.persistence)
            .finish()
    }
}

/// What a path resolves to. A name can hold a spec and a submap at once;
/// lookups prefer the spec.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Map(&'a ResourceMap),
    Spec(&'a ResourceSpec),
}

/// Specs and submaps live in separate namespaces, so `"hero"` and
/// `"hero/idle"` can both exist. Each spec name keeps a stack: the last
/// spec is live and the earlier ones stay reachable through
/// [`ResourceMap::shadowed`].
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    maps: BTreeMap<String, ResourceMap>,
    specs: BTreeMap<String, Vec<ResourceSpec>>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a spec, creating intermediate maps. Returns the live spec it
    /// replaced; shadowed specs under the same name are kept.
    pub fn insert(&mut self, path: &str, spec: ResourceSpec) -> Result<Option<ResourceSpec>, ResourceError> {
        let (parents, name) = split(path)?;
        let stack = self.descend_or_create(&parents).specs.entry(name.to_string()).or_default();
        let previous = stack.pop();
        stack.push(spec);
        Ok(previous)
    }

    /// Insert a spec on top of any spec already at `path`. The new spec
    /// becomes live and the old one moves to [`ResourceMap::shadowed`].
    pub fn shadow(&mut self, path: &str, spec: ResourceSpec) -> Result<(), ResourceError> {
        let (parents, name) = split(path)?;
        self.descend_or_create(&parents)
            .specs
            .entry(name.to_string())
            .or_default()
            .push(spec);
        Ok(())
    }

    fn descend_or_create(&mut self, parents: &[&str]) -> &mut ResourceMap {
        let mut map = self;
        for segment in parents {
            map = map.maps.entry(segment.to_string()).or_default();
        }
        map
    }

    fn descend(&self, parents: &[&str]) -> Option<&ResourceMap> {
        let mut map = self;
        for segment in parents {
            map = map.maps.get(*segment)?;
        }
        Some(map)
    }

    fn descend_mut(&mut self, parents: &[&str]) -> Option<&mut ResourceMap> {
        let mut map = self;
        for segment in parents {
            map = map.maps.get_mut(*segment)?;
        }
        Some(map)
    }

    pub fn get(&self, path: &str) -> Option<Node<'_>> {
        if let Some(spec) = self.spec(path) {
            return Some(Node::Spec(spec));
        }
        self.submap(path).map(Node::Map)
    }

    pub fn spec(&self, path: &str) -> Option<&ResourceSpec> {
        let (parents, name) = split(path).ok()?;
        self.descend(&parents)?.specs.get(name)?.last()
    }

    /// Specs hidden under the live one at `path`, oldest first.
    pub fn shadowed(&self, path: &str) -> &[ResourceSpec] {
        let Ok((parents, name)) = split(path) else {
            return &[];
        };
        match self.descend(&parents).and_then(|map| map.specs.get(name)) {
            Some(stack) => &stack[..stack.len().saturating_sub(1)],
            None => &[],
        }
    }

    pub fn submap(&self, path: &str) -> Option<&ResourceMap> {
        let (parents, name) = split(path).ok()?;
        self.descend(&parents)?.maps.get(name)
    }

    /// Remove the live spec at `path`. The most recently shadowed spec, if
    /// any, becomes live again.
    pub fn remove(&mut self, path: &str) -> Option<ResourceSpec> {
        let (parents, name) = split(path).ok()?;
        let map = self.descend_mut(&parents)?;
        let stack = map.specs.get_mut(name)?;
        let removed = stack.pop();
        if stack.is_empty() {
            map.specs.remove(name);
        }
        removed
    }

    /// Remove a whole subtree.
    pub fn remove_map(&mut self, path: &str) -> Option<ResourceMap> {
        let (parents, name) = split(path).ok()?;
        self.descend_mut(&parents)?.maps.remove(name)
    }

    pub fn clear(&mut self) {
        self.maps.clear();
        self.specs.clear();
    }

    /// Number of live specs in the whole tree.
    pub fn len(&self) -> usize {
        self.specs.len() + self.maps.values().map(ResourceMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live spec with its full map path, in path order.
    pub fn specs(&self) -> Vec<(String, &ResourceSpec)> {
        let mut out = Vec::new();
        self.collect_specs("", &mut out);
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out
    }

    fn collect_specs<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a ResourceSpec)>) {
        let join = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}{SEPARATOR}{name}")
            }
        };
        for (name, stack) in &self.specs {
            if let Some(spec) = stack.last() {
                out.push((join(name), spec));
            }
        }
        for (name, child) in &self.maps {
            child.collect_specs(&join(name), out);
        }
    }

    /// Mint a handle for the spec at `path`.
    pub fn handle<T: Send + Sync + 'static>(
        &self,
        cache: &ResourceCache,
        path: &str,
    ) -> Result<ResourceHandle<T>, ResourceError> {
        self.spec(path)
            .ok_or_else(|| ResourceError::UnknownPath {
                path: path.to_string(),
            })?
            .handle(cache)
    }

    /// Walk `root` recursively and register every file some importer accepts.
    ///
    /// Map paths mirror the directory layout relative to `root`. Two files
    /// landing on the same key never stop the scan: the later one wins and
    /// the earlier one is shadowed or replaced per [`ScanOptions`]. Returns
    /// the number of specs added.
    pub fn scan(
        &mut self,
        root: impl AsRef<Path>,
        importers: &[&dyn Importer],
        options: ScanOptions,
    ) -> Result<usize, ResourceError> {
        let root = root.as_ref();
        let mut added = 0;

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|error| ResourceError::Io {
                path: error.path().unwrap_or(root).to_path_buf(),
                source: error.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(spec) = importers.iter().find_map(|importer| importer.import(entry.path())) else {
                tracing::trace!(path = %entry.path().display(), "no importer accepted file");
                continue;
            };

            let Some(key) = map_path(root, entry.path(), options) else {
                continue;
            };
            if let Some(previous) = self.spec(&key) {
                tracing::debug!(
                    key = %key,
                    previous = previous.path(),
                    current = spec.path(),
                    nested = options.nest_on_conflict,
                    "scanned files share a key"
                );
            }
            let inserted = if options.nest_on_conflict {
                self.shadow(&key, spec)
            } else {
                self.insert(&key, spec).map(drop)
            };
            if let Err(error) = inserted {
                tracing::warn!(key = %key, %error, "skipping scanned file");
                continue;
            }
            added += 1;
        }

        tracing::debug!(root = %root.display(), added, "resource scan complete");
        Ok(added)
    }
}

/// Controls how scanned files are named in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Drop the final extension (`hero.png` becomes `hero`).
    pub strip_extensions: bool,
    /// Keep the earlier spec reachable through [`ResourceMap::shadowed`]
    /// when two files map to the same key, instead of replacing it.
    pub nest_on_conflict: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            strip_extensions: false,
            nest_on_conflict: true,
        }
    }
}

/// Decides whether (and how) a scanned file becomes a resource.
pub trait Importer {
    fn import(&self, path: &Path) -> Option<ResourceSpec>;
}

impl<F> Importer for F
where
    F: Fn(&Path) -> Option<ResourceSpec>,
{
    fn import(&self, path: &Path) -> Option<ResourceSpec> {
        self(path)
    }
}

/// Accepts files by (case-insensitive) extension and loads them with one loader.
pub struct ExtensionImporter<L: Loader> {
    extensions: Vec<String>,
    loader: Arc<L>,
    persistence: Persistence,
}

impl<L: Loader> ExtensionImporter<L> {
    pub fn new(extensions: &[&str], loader: Arc<L>, persistence: Persistence) -> Self {
        Self {
            extensions: extensions.iter().map(|ext| ext.to_ascii_lowercase()).collect(),
            loader,
            persistence,
        }
    }
}

impl<L: Loader> Importer for ExtensionImporter<L> {
    fn import(&self, path: &Path) -> Option<ResourceSpec> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.contains(&ext) {
            return None;
        }
        let path = path.to_str()?;
        Some(ResourceSpec::new(path, Arc::clone(&self.loader), self.persistence))
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|segment| !segment.is_empty())
}

fn split(path: &str) -> Result<(Vec<&str>, &str), ResourceError> {
    let mut parts: Vec<&str> = segments(path).collect();
    let name = parts.pop().ok_or_else(|| ResourceError::UnknownPath {
        path: path.to_string(),
    })?;
    Ok((parts, name))
}

fn map_path(root: &Path, file: &Path, options: ScanOptions) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();

    if options.strip_extensions {
        if let (Some(last), Some(stem)) = (parts.last_mut(), relative.file_stem()) {
            *last = stem.to_string_lossy().into_owned();
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(&SEPARATOR.to_string()))
}
