// driver.rs - Owns the resource cache and the resident worlds
//
// Exactly one resident world is active at a time. Inactive worlds keep their
// state but have event dispatch disabled; their events queue up and are
// flushed when the world becomes active again. Discarding a world drops it
// (releasing every handle its components held) and then sweeps the cache.
//
// Worlds registered with a factory can be rebuilt: switching to one that was
// discarded builds it again under the same id, and `Enter::Restart` rebuilds
// it even when it is still resident.

use std::collections::HashMap;

use trellis_asset::ResourceCache;
use trellis_core::ecs::{
    ControllerProcessor, Enter, LoopRequest, Retire, TickReport, World, WorldEvent, WorldId,
};

use crate::{BuildError, DriverError, RuntimeConfig};

type BuildFn = Box<dyn FnMut(&mut World, &ResourceCache) -> Result<(), BuildError> + Send>;

struct Factory {
    name: String,
    build: BuildFn,
}

pub struct Driver {
    config: RuntimeConfig,
    cache: ResourceCache,
    worlds: HashMap<WorldId, World>,
    factories: HashMap<WorldId, Factory>,
    active: Option<WorldId>,
    quit: bool,
    switches: u64,
}

impl Driver {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            cache: ResourceCache::new(),
            worlds: HashMap::new(),
            factories: HashMap::new(),
            active: None,
            quit: false,
            switches: 0,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Create a resident world configured from [`RuntimeConfig`], with a
    /// controller pass already scheduled.
    pub fn create_world(&mut self, name: impl Into<String>) -> WorldId {
        let world = self.blank_world(WorldId::new_unique(), name.into());
        self.insert_world(world)
    }

    fn blank_world(&self, id: WorldId, name: String) -> World {
        let mut world = World::with_id(id, name, self.config.max_entities);
        world.add_processor(ControllerProcessor, self.config.controller_priority);
        world
    }

    /// Register a world that can be rebuilt. `build` populates a blank world
    /// (as [`Driver::create_world`] makes them); it runs now and again every
    /// time the world is rebuilt. The world is resident but inactive.
    pub fn register_world<F>(&mut self, name: impl Into<String>, build: F) -> Result<WorldId, DriverError>
    where
        F: FnMut(&mut World, &ResourceCache) -> Result<(), BuildError> + Send + 'static,
    {
        let id = WorldId::new_unique();
        self.factories.insert(
            id,
            Factory {
                name: name.into(),
                build: Box::new(build),
            },
        );
        match self.build_world(id) {
            Ok(world) => {
                self.insert_world(world);
                Ok(id)
            }
            Err(error) => {
                self.factories.remove(&id);
                Err(error)
            }
        }
    }

    /// Whether `id` can be rebuilt from a factory.
    pub fn is_rebuildable(&self, id: WorldId) -> bool {
        self.factories.contains_key(&id)
    }

    fn build_world(&mut self, id: WorldId) -> Result<World, DriverError> {
        let Some(name) = self.factories.get(&id).map(|factory| factory.name.clone()) else {
            return Err(if self.worlds.contains_key(&id) {
                DriverError::NotRebuildable { id }
            } else {
                DriverError::UnknownWorld { id }
            });
        };
        let mut world = self.blank_world(id, name);
        if let Some(factory) = self.factories.get_mut(&id) {
            (factory.build)(&mut world, &self.cache).map_err(|source| DriverError::Build { id, source })?;
        }
        tracing::debug!(world = %id, name = world.name(), "world built");
        Ok(world)
    }

    /// Make a world resident. It stays inactive until activated.
    pub fn insert_world(&mut self, mut world: World) -> WorldId {
        let id = world.id();
        world.set_dispatch_enabled(false);
        tracing::debug!(world = %id, name = world.name(), "world resident");
        self.worlds.insert(id, world);
        id
    }

    /// Activate a resident world. The previously active world stays resident.
    pub fn activate(&mut self, id: WorldId) -> Result<(), DriverError> {
        self.switch(id, Retire::Keep)
    }

    /// Retire the active world and activate `target`.
    pub fn switch(&mut self, target: WorldId, retire: Retire) -> Result<(), DriverError> {
        self.switch_with(target, retire, Enter::Resume)
    }

    /// Retire the active world and enter `target`.
    ///
    /// The outgoing world sees [`WorldEvent::SwitchedOut`] before it is kept
    /// or discarded. The incoming world sees [`WorldEvent::SwitchedIn`] as the
    /// first event after its dispatch is enabled. A target that has to be
    /// rebuilt is built before anything is retired, so a failed build leaves
    /// the active world untouched.
    pub fn switch_with(&mut self, target: WorldId, retire: Retire, enter: Enter) -> Result<(), DriverError> {
        let rebuild = enter == Enter::Restart || !self.worlds.contains_key(&target);
        if !rebuild && self.active == Some(target) {
            return Ok(());
        }
        let fresh = if rebuild {
            Some(self.build_world(target)?)
        } else {
            None
        };

        let from = self.active.take();
        if let Some(current) = from {
            if let Some(world) = self.worlds.get_mut(&current) {
                world.emit(WorldEvent::SwitchedOut { from: current, to: target });
            }
            match retire {
                Retire::Keep => {
                    if let Some(world) = self.worlds.get_mut(&current) {
                        world.set_dispatch_enabled(false);
                    }
                }
                Retire::Discard => self.drop_world(current),
            }
        }

        if let Some(world) = fresh {
            if self.worlds.contains_key(&target) {
                self.drop_world(target);
            }
            self.insert_world(world);
        }

        if let Some(world) = self.worlds.get_mut(&target) {
            world.emit(WorldEvent::SwitchedIn { from, to: target });
            world.set_dispatch_enabled(true);
            tracing::info!(world = %target, name = world.name(), ?retire, ?enter, "world activated");
        }
        self.active = Some(target);
        self.switches += 1;
        Ok(())
    }

    /// Drop a resident world and sweep the cache. A registered factory is
    /// kept, so the world can be entered again later.
    pub fn discard(&mut self, id: WorldId) -> Result<(), DriverError> {
        if !self.worlds.contains_key(&id) {
            return Err(DriverError::UnknownWorld { id });
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.drop_world(id);
        Ok(())
    }

    fn drop_world(&mut self, id: WorldId) {
        if let Some(world) = self.worlds.remove(&id) {
            tracing::debug!(world = %id, name = world.name(), "discarding world");
            drop(world);
        }
        let report = self.cache.sweep();
        tracing::debug!(evicted = report.evicted.len(), retained = report.retained, "cache swept after discard");
    }

    /// Tick the active world, then act on whatever it requested.
    pub fn tick(&mut self, dt: f32) -> Result<TickReport, DriverError> {
        let id = self.active.ok_or(DriverError::NoActiveWorld)?;
        let world = self
            .worlds
            .get_mut(&id)
            .ok_or(DriverError::UnknownWorld { id })?;

        let report = world.tick(dt);
        match world.take_request() {
            Some(LoopRequest::Quit) => {
                tracing::info!(world = %id, "quit requested");
                world.emit(WorldEvent::Quit);
                self.quit = true;
            }
            Some(LoopRequest::Switch { target, retire, enter }) => self.switch_with(target, retire, enter)?,
            None => {}
        }
        Ok(report)
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Number of successful world activations.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub fn active_id(&self) -> Option<WorldId> {
        self.active
    }

    pub fn active_world(&self) -> Option<&World> {
        self.active.and_then(|id| self.worlds.get(&id))
    }

    pub fn active_world_mut(&mut self) -> Option<&mut World> {
        self.active.and_then(|id| self.worlds.get_mut(&id))
    }

    pub fn world(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(&id)
    }

    pub fn world_mut(&mut self, id: WorldId) -> Option<&mut World> {
        self.worlds.get_mut(&id)
    }

    pub fn world_ids(&self) -> Vec<WorldId> {
        let mut ids: Vec<WorldId> = self.worlds.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
