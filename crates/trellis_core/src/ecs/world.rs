// world.rs - A self-contained entity/component/processor space
//
// The world glues the entity registry, the component store and the processor
// scheduler together and keeps them consistent: every component in storage
// belongs to a live entity, and every live entity's type list matches what is
// stored for it.

use crate::ecs::component::short_type_name;
use crate::ecs::scheduler::Unregistered;
use crate::ecs::{
    Commands, Component, ComponentSet, ComponentStore, Controller, EcsError, Entity,
    EntityRegistry, EventDispatcher, HandlerId, Processor, ProcessorId, ProcessorScheduler,
    ProcessorUpdateFailed, Query, TickReport, WorldEvent,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use trellis_metrics::ProcessorProfiler;

/// Process-unique world identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(u64);

impl WorldId {
    pub fn new_unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

/// What happens to the outgoing world on a switch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Retire {
    /// Stay resident with event dispatch disabled.
    #[default]
    Keep,
    /// Drop the world and sweep the resource cache.
    Discard,
}

/// How the incoming world is entered on a switch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Enter {
    /// Use the resident world as it was left. A world that is no longer
    /// resident is rebuilt from its factory.
    #[default]
    Resume,
    /// Rebuild the world from its factory even if it is resident.
    Restart,
}

/// Request left by game logic for the driver to act on after the tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopRequest {
    Quit,
    Switch {
        target: WorldId,
        retire: Retire,
        enter: Enter,
    },
}

pub struct World {
    id: WorldId,
    name: String,
    entities: EntityRegistry,
    components: ComponentStore,
    scheduler: ProcessorScheduler,
    events: EventDispatcher<WorldEvent>,
    request: Option<LoopRequest>,
    ticks: u64,
}

impl World {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(WorldId::new_unique(), name.into(), EntityRegistry::new())
    }

    /// World whose registry refuses to hold more than `capacity` entity slots.
    pub fn with_entity_capacity(name: impl Into<String>, capacity: u32) -> Self {
        Self::with_registry(
            WorldId::new_unique(),
            name.into(),
            EntityRegistry::with_capacity(capacity),
        )
    }

    /// Empty world under an existing id, used to rebuild a world in place.
    /// The caller must make sure no other world with `id` stays alive.
    pub fn with_id(id: WorldId, name: impl Into<String>, entity_capacity: Option<u32>) -> Self {
        let entities = match entity_capacity {
            Some(capacity) => EntityRegistry::with_capacity(capacity),
            None => EntityRegistry::new(),
        };
        Self::with_registry(id, name.into(), entities)
    }

    fn with_registry(id: WorldId, name: String, entities: EntityRegistry) -> Self {
        tracing::debug!(%id, name = %name, "world created");
        Self {
            id,
            name,
            entities,
            components: ComponentStore::new(),
            scheduler: ProcessorScheduler::new(),
            events: EventDispatcher::new(),
            request: None,
            ticks: 0,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn create_entity(&mut self) -> Result<Entity, EcsError> {
        let entity = self.entities.create()?;
        tracing::trace!(world = %self.id, %entity, "entity created");
        self.events.emit(WorldEvent::EntityCreated(entity));
        Ok(entity)
    }

    /// Delete an entity and every component it holds. Controller `on_detach`
    /// hooks fire first, in reverse attach order.
    pub fn delete_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        let types = self.entities.delete(entity)?;

        for ty in types.iter().rev() {
            if self.components.is_controller_type(*ty) {
                self.components.fire_detach(*ty, entity);
            }
        }
        for ty in &types {
            self.components.drop_component(*ty, entity);
        }

        tracing::trace!(world = %self.id, %entity, components = types.len(), "entity deleted");
        self.events.emit(WorldEvent::EntityDeleted(entity));
        Ok(())
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach `component` to `entity`, replacing any existing instance of the
    /// same type. Controller types get detach-then-attach on replacement.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<(), EcsError> {
        self.entities.track(entity, std::any::TypeId::of::<T>())?;

        let world = self.id;
        let column = self.components.register::<T>();
        if column.is_controller() {
            column.attach(entity, component, world);
        } else {
            column.insert(entity, component);
        }

        self.events.emit(WorldEvent::ComponentAdded {
            entity,
            component: short_type_name::<T>(),
        });
        Ok(())
    }

    /// Attach a controller, registering its type's hooks on first use.
    pub fn add_controller<T: Controller>(&mut self, entity: Entity, controller: T) -> Result<(), EcsError> {
        self.register_controller::<T>();
        self.add_component(entity, controller)
    }

    /// Mark `T`'s column as a controller column. Instances already stored are
    /// not retroactively attached.
    pub fn register_controller<T: Controller>(&mut self) {
        self.components.register_controller::<T>();
    }

    /// Detach and return an entity's `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::UnknownEntity { entity });
        }

        let removed = self
            .components
            .column_mut::<T>()
            .and_then(|column| column.detach(entity))
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: short_type_name::<T>(),
            })?;

        self.entities.untrack(entity, std::any::TypeId::of::<T>())?;
        self.events.emit(WorldEvent::ComponentRemoved {
            entity,
            component: short_type_name::<T>(),
        });
        Ok(removed)
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::UnknownEntity { entity });
        }
        self.components
            .get::<T>(entity)
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: short_type_name::<T>(),
            })
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::UnknownEntity { entity });
        }
        self.components
            .get_mut::<T>(entity)
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: short_type_name::<T>(),
            })
    }

    /// `None` for dead entities and missing components alike.
    pub fn try_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.components.get::<T>(entity)
    }

    pub fn try_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.entities.is_alive(entity) {
            return None;
        }
        self.components.get_mut::<T>(entity)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity) && self.components.contains::<T>(entity)
    }

    /// Type names of an entity's components, in attach order.
    pub fn components_of(&self, entity: Entity) -> Result<Vec<&'static str>, EcsError> {
        Ok(self
            .entities
            .types_of(entity)?
            .iter()
            .filter_map(|ty| self.components.type_name(*ty))
            .collect())
    }

    /// Snapshot query over the component set `Q`, e.g. `world.query::<(Pos, Vel)>()`.
    pub fn query<Q: ComponentSet>(&self) -> Query<'_, Q> {
        Query::new(&self.components)
    }

    /// Owned snapshot of the entities matching `Q`, for loops that mutate the
    /// world while walking the result.
    pub fn query_entities<Q: ComponentSet>(&self) -> Vec<Entity> {
        self.components.matching(&Q::type_ids())
    }

    /// Run `on_update` on every controller, then apply the commands they queued.
    pub fn update_controllers(&mut self, dt: f32) -> Result<(), EcsError> {
        let mut commands = Commands::new();
        self.components.update_controllers(self.id, dt, &mut commands);
        if commands.is_empty() {
            return Ok(());
        }
        commands.apply(self)
    }

    // ------------------------------------------------------------------
    // Processors
    // ------------------------------------------------------------------

    pub fn add_processor<P: Processor>(&mut self, processor: P, priority: i32) -> ProcessorId {
        self.add_boxed_processor(Box::new(processor), priority)
    }

    pub fn add_boxed_processor(&mut self, processor: Box<dyn Processor>, priority: i32) -> ProcessorId {
        let id = self.scheduler.register(processor, priority, self.id);
        let name = self.scheduler.name_of(id).unwrap_or_default().to_string();
        self.events.emit(WorldEvent::ProcessorAdded { id, name });
        id
    }

    /// Unregister a processor and hand it back.
    ///
    /// Removing the processor that is currently running is deferred until its
    /// update returns; that case yields `Ok(None)`.
    pub fn remove_processor(&mut self, id: ProcessorId) -> Result<Option<Box<dyn Processor>>, EcsError> {
        match self.scheduler.unregister(id)? {
            Unregistered::Removed(processor) => Ok(Some(self.retire_processor(id, processor))),
            Unregistered::Deferred => Ok(None),
        }
    }

    /// First registered processor of type `P`. Not visible while it runs.
    pub fn get_processor<P: Processor>(&self) -> Option<&P> {
        self.scheduler.get::<P>()
    }

    pub fn get_processor_mut<P: Processor>(&mut self) -> Option<&mut P> {
        self.scheduler.get_mut::<P>()
    }

    pub fn processor_id<P: Processor>(&self) -> Option<ProcessorId> {
        self.scheduler.id_of::<P>()
    }

    /// Registered processors in execution order.
    pub fn processor_ids(&self) -> Vec<ProcessorId> {
        self.scheduler.ids()
    }

    pub fn processor_count(&self) -> usize {
        self.scheduler.len()
    }

    /// The processor whose update is executing, if any.
    pub fn current_processor(&self) -> Option<ProcessorId> {
        self.scheduler.running()
    }

    pub fn profiler(&self) -> &ProcessorProfiler {
        self.scheduler.profiler()
    }

    /// Run every registered processor once, in priority order.
    ///
    /// A failing processor is recorded in the report and skipped for the rest
    /// of this tick only.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let order = self.scheduler.begin_tick();
        let mut report = TickReport {
            dt,
            ..TickReport::default()
        };

        for id in order {
            let Some(mut processor) = self.scheduler.checkout(id) else {
                continue;
            };

            let started = Instant::now();
            let result = processor.update(self, dt);
            let elapsed = started.elapsed();
            report.ran += 1;

            if let Err(source) = result {
                let name = processor.name().to_string();
                tracing::warn!(world = %self.id, processor = %id, name = %name, error = %source, "processor update failed");
                report.failures.push(ProcessorUpdateFailed {
                    processor: id,
                    name,
                    source,
                });
            }

            if let Some(removed) = self.scheduler.checkin(id, processor, elapsed) {
                self.retire_processor(id, removed);
            }
        }

        self.ticks += 1;
        report
    }

    fn retire_processor(&mut self, id: ProcessorId, mut processor: Box<dyn Processor>) -> Box<dyn Processor> {
        processor.on_unregister();
        self.events.emit(WorldEvent::ProcessorRemoved {
            id,
            name: processor.name().to_string(),
        });
        processor
    }

    /// Unregister every processor and delete every entity.
    ///
    /// Slot generations survive, so handles taken before the clear stay stale.
    pub fn clear(&mut self) {
        for (id, processor) in self.scheduler.drain() {
            self.retire_processor(id, processor);
        }

        let live: Vec<Entity> = self.entities.iter().collect();
        for entity in live {
            if let Err(error) = self.delete_entity(entity) {
                tracing::debug!(%entity, %error, "entity vanished during clear");
            }
        }

        self.request = None;
        tracing::debug!(world = %self.id, name = %self.name, "world cleared");
    }

    // ------------------------------------------------------------------
    // Loop requests
    // ------------------------------------------------------------------

    pub fn request_quit(&mut self) {
        self.request = Some(LoopRequest::Quit);
    }

    pub fn request_switch(&mut self, target: WorldId, retire: Retire) {
        self.request_switch_with(target, retire, Enter::Resume);
    }

    pub fn request_switch_with(&mut self, target: WorldId, retire: Retire, enter: Enter) {
        self.request = Some(LoopRequest::Switch { target, retire, enter });
    }

    pub fn pending_request(&self) -> Option<LoopRequest> {
        self.request
    }

    pub fn take_request(&mut self) -> Option<LoopRequest> {
        self.request.take()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&WorldEvent) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn emit(&mut self, event: WorldEvent) {
        self.events.emit(event);
    }

    /// Disabled worlds queue their events until dispatch is re-enabled.
    pub fn set_dispatch_enabled(&mut self, enabled: bool) {
        self.events.set_enabled(enabled);
    }

    pub fn dispatch_enabled(&self) -> bool {
        self.events.is_enabled()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new("world")
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.events.clear();
        self.clear();
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("entities", &self.entities.len())
            .field("processors", &self.scheduler.len())
            .field("ticks", &self.ticks)
            .finish()
    }
}
