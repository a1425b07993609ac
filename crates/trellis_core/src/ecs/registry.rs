// registry.rs - Entity allocation and per-entity component bookkeeping
//
// Slots are recycled LIFO through a free list. The generation is bumped when a
// slot is freed, so a recycled slot never hands out a handle equal to one that
// was live before.

use crate::ecs::{EcsError, Entity};
use std::any::TypeId;

struct Slot {
    generation: u32,
    alive: bool,
    components: Vec<TypeId>, // attach order
}

/// Allocates, validates and recycles entity identifiers.
pub struct EntityRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    capacity: u32,
}

impl EntityRegistry {
    /// Registry limited only by the 32-bit index space.
    pub fn new() -> Self {
        Self::with_capacity(u32::MAX)
    }

    /// Registry that refuses to grow past `capacity` slots.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            capacity,
        }
    }

    /// Allocate an entity, preferring a recycled slot.
    pub fn create(&mut self) -> Result<Entity, EcsError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(!slot.alive && slot.components.is_empty());
            slot.alive = true;
            self.live += 1;
            return Ok(Entity::new(index, slot.generation));
        }

        if self.slots.len() as u64 >= self.capacity as u64 {
            return Err(EcsError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
            components: Vec::new(),
        });
        self.live += 1;
        Ok(Entity::new(index, 0))
    }

    /// Mark an entity dead and recycle its slot.
    ///
    /// Returns the component types the entity held, in attach order, so the
    /// caller can cascade the removal into component storage.
    pub fn delete(&mut self, entity: Entity) -> Result<Vec<TypeId>, EcsError> {
        let slot = self.live_slot_mut(entity)?;
        slot.alive = false;
        let components = std::mem::take(&mut slot.components);
        let next_generation = slot.generation.checked_add(1);
        self.live -= 1;

        match next_generation {
            Some(generation) => {
                self.slots[entity.index() as usize].generation = generation;
                self.free.push(entity.index());
            }
            // Out of generations: retire the slot instead of risking an alias.
            None => tracing::debug!(index = entity.index(), "retiring exhausted entity slot"),
        }

        Ok(components)
    }

    /// O(1) liveness check.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index() as usize)
            .map_or(false, |slot| slot.alive && slot.generation == entity.generation())
    }

    /// Record that `entity` now holds a component of type `ty`.
    pub fn track(&mut self, entity: Entity, ty: TypeId) -> Result<(), EcsError> {
        let slot = self.live_slot_mut(entity)?;
        if !slot.components.contains(&ty) {
            slot.components.push(ty);
        }
        Ok(())
    }

    /// Forget that `entity` holds a component of type `ty`.
    pub fn untrack(&mut self, entity: Entity, ty: TypeId) -> Result<(), EcsError> {
        let slot = self.live_slot_mut(entity)?;
        slot.components.retain(|held| *held != ty);
        Ok(())
    }

    /// Component types held by a live entity, in attach order.
    pub fn types_of(&self, entity: Entity) -> Result<&[TypeId], EcsError> {
        match self.slots.get(entity.index() as usize) {
            Some(slot) if slot.alive && slot.generation == entity.generation() => {
                Ok(&slot.components)
            }
            _ => Err(EcsError::UnknownEntity { entity }),
        }
    }

    /// Iterate live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| Entity::new(index as u32, slot.generation))
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn live_slot_mut(&mut self, entity: Entity) -> Result<&mut Slot, EcsError> {
        match self.slots.get_mut(entity.index() as usize) {
            Some(slot) if slot.alive && slot.generation == entity.generation() => Ok(slot),
            _ => Err(EcsError::UnknownEntity { entity }),
        }
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
