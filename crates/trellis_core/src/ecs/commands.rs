// commands.rs - Deferred structural changes and the controller update context
//
// During `on_update` a controller can read other components through its
// `UpdateContext`, but anything that would reshape the world (deleting
// entities, adding components) is queued as a command and applied once the
// controller pass is over.

use crate::ecs::{Component, ComponentSet, ComponentStore, EcsError, Entity, World, WorldId};

type Command = Box<dyn FnOnce(&mut World) -> Result<(), EcsError> + Send>;

/// Queue of world mutations applied in submission order.
#[derive(Default)]
pub struct Commands {
    queue: Vec<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    pub fn delete_entity(&mut self, entity: Entity) {
        self.push(move |world| world.delete_entity(entity));
    }

    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) {
        self.push(move |world| world.add_component(entity, component));
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.push(move |world| world.remove_component::<T>(entity).map(drop));
    }

    /// Create an entity and hand it to `build` for initial components.
    pub fn create_entity_with<F>(&mut self, build: F)
    where
        F: FnOnce(&mut World, Entity) -> Result<(), EcsError> + Send + 'static,
    {
        self.push(move |world| {
            let entity = world.create_entity()?;
            build(world, entity)
        });
    }

    pub fn request_quit(&mut self) {
        self.push(|world| {
            world.request_quit();
            Ok(())
        });
    }

    /// Queue an arbitrary mutation.
    pub fn push<F>(&mut self, command: F)
    where
        F: FnOnce(&mut World) -> Result<(), EcsError> + Send + 'static,
    {
        self.queue.push(Box::new(command));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Apply every queued command. All commands run even if one fails; the
    /// first error is returned.
    pub fn apply(&mut self, world: &mut World) -> Result<(), EcsError> {
        let mut first_error = None;
        for command in self.queue.drain(..) {
            if let Err(error) = command(world) {
                tracing::debug!(%error, "deferred command failed");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// What a controller sees during `on_update`.
///
/// Reads go to the world's component store, except for the column being
/// updated: while a controller type runs, its own instances are checked out,
/// so `component::<Self>()` returns `None`.
pub struct UpdateContext<'a> {
    world: WorldId,
    components: &'a ComponentStore,
    commands: &'a mut Commands,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(world: WorldId, components: &'a ComponentStore, commands: &'a mut Commands) -> Self {
        Self {
            world,
            components,
            commands,
        }
    }

    pub fn world_id(&self) -> WorldId {
        self.world
    }

    pub fn component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.components.get::<T>(entity)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.components.contains::<T>(entity)
    }

    /// Entities holding every component in `S`, as stored before the pass.
    pub fn entities_with<S: ComponentSet>(&self) -> Vec<Entity> {
        self.components.matching(&S::type_ids())
    }

    pub fn commands(&mut self) -> &mut Commands {
        self.commands
    }
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands")
            .field("queued", &self.queue.len())
            .finish()
    }
}
