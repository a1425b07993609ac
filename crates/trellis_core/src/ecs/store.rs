// store.rs - Per-type sparse-set component storage
//
// Each component type gets one `Column<T>`: a dense `Vec<T>` for cache-friendly
// iteration, the owning entity of every dense row, and a sparse index from
// entity slot to dense row. Columns are type-erased behind `ErasedColumn` so
// the world can cascade deletions and run controller passes without knowing
// the concrete types.

use crate::ecs::component::{short_type_name, ControllerHooks};
use crate::ecs::{AsAny, Commands, Component, Controller, Entity, UpdateContext, WorldId};
use std::any::TypeId;
use std::collections::HashMap;

/// Dense storage for every instance of one component type.
pub struct Column<T> {
    dense: Vec<T>,
    owners: Vec<Entity>,
    sparse: Vec<Option<u32>>, // entity index -> dense row
    hooks: Option<ControllerHooks<T>>,
}

impl<T: Component> Column<T> {
    fn new() -> Self {
        Self {
            dense: Vec::new(),
            owners: Vec::new(),
            sparse: Vec::new(),
            hooks: None,
        }
    }

    #[inline]
    fn row_of(&self, entity: Entity) -> Option<usize> {
        let row = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.owners[row] == entity).then_some(row)
    }

    /// Insert or replace; returns the replaced value. No hooks fire.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(row) = self.row_of(entity) {
            return Some(std::mem::replace(&mut self.dense[row], value));
        }

        let index = entity.index() as usize;
        if self.sparse.len() <= index {
            self.sparse.resize(index + 1, None);
        }
        self.sparse[index] = Some(self.dense.len() as u32);
        self.dense.push(value);
        self.owners.push(entity);
        None
    }

    /// Remove without firing hooks.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let row = self.row_of(entity)?;
        self.sparse[entity.index() as usize] = None;
        let value = self.dense.swap_remove(row);
        self.owners.swap_remove(row);
        if let Some(moved) = self.owners.get(row) {
            self.sparse[moved.index() as usize] = Some(row as u32);
        }
        Some(value)
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.row_of(entity).map(|row| &self.dense[row])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.row_of(entity).map(move |row| &mut self.dense[row])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.row_of(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Owners in dense order.
    pub fn entities(&self) -> &[Entity] {
        &self.owners
    }

    /// `(owner, component)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }

    pub fn is_controller(&self) -> bool {
        self.hooks.is_some()
    }

    /// Insert with detach-then-attach semantics for controller columns.
    pub(crate) fn attach(&mut self, entity: Entity, value: T, world: WorldId) -> Option<T> {
        if let (Some(hooks), Some(old)) = (self.hooks, self.get_mut(entity)) {
            (hooks.detach)(old, entity);
        }
        let previous = self.insert(entity, value);
        if let (Some(hooks), Some(new)) = (self.hooks, self.get_mut(entity)) {
            (hooks.attach)(new, entity, world);
        }
        previous
    }

    /// Fire `on_detach` (if any) and then remove.
    pub(crate) fn detach(&mut self, entity: Entity) -> Option<T> {
        if let (Some(hooks), Some(current)) = (self.hooks, self.get_mut(entity)) {
            (hooks.detach)(current, entity);
        }
        self.remove(entity)
    }
}

/// Type-erased view of a `Column<T>`.
pub(crate) trait ErasedColumn: AsAny + Send {
    fn type_name(&self) -> &'static str;
    fn contains(&self, entity: Entity) -> bool;
    fn len(&self) -> usize;
    fn entities(&self) -> &[Entity];
    fn is_controller(&self) -> bool;
    fn fire_detach(&mut self, entity: Entity);
    fn drop_component(&mut self, entity: Entity) -> bool;
    fn update_controllers(&mut self, dt: f32, ctx: &mut UpdateContext<'_>);
}

impl<T: Component> ErasedColumn for Column<T> {
    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }

    fn contains(&self, entity: Entity) -> bool {
        Column::contains(self, entity)
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn entities(&self) -> &[Entity] {
        &self.owners
    }

    fn is_controller(&self) -> bool {
        self.hooks.is_some()
    }

    fn fire_detach(&mut self, entity: Entity) {
        if let (Some(hooks), Some(current)) = (self.hooks, self.get_mut(entity)) {
            (hooks.detach)(current, entity);
        }
    }

    fn drop_component(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn update_controllers(&mut self, dt: f32, ctx: &mut UpdateContext<'_>) {
        let Some(hooks) = self.hooks else {
            return;
        };
        for (owner, component) in self.owners.iter().zip(self.dense.iter_mut()) {
            (hooks.update)(component, *owner, dt, ctx);
        }
    }
}

/// All component columns of one world, keyed by `TypeId`.
#[derive(Default)]
pub struct ComponentStore {
    columns: HashMap<TypeId, Box<dyn ErasedColumn>>,
    order: Vec<TypeId>, // first-registration order
}

impl ComponentStore {
    pub fn new() -> Self {
        Self {
            columns: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Ensure a column exists for `T`.
    pub fn register<T: Component>(&mut self) -> &mut Column<T> {
        let ty = TypeId::of::<T>();
        if !self.columns.contains_key(&ty) {
            tracing::trace!(component = short_type_name::<T>(), "registering component column");
            self.columns.insert(ty, Box::new(Column::<T>::new()));
            self.order.push(ty);
        }
        self.column_mut::<T>()
            .expect("column registered above has the requested type")
    }

    /// Ensure a column exists for `T` and that it dispatches controller hooks.
    pub fn register_controller<T: Controller>(&mut self) -> &mut Column<T> {
        let column = self.register::<T>();
        if column.hooks.is_none() {
            column.hooks = Some(ControllerHooks::of());
        }
        column
    }

    pub fn column<T: Component>(&self) -> Option<&Column<T>> {
        self.columns
            .get(&TypeId::of::<T>())
            .and_then(|column| (**column).as_any().downcast_ref::<Column<T>>())
    }

    pub fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        self.columns
            .get_mut(&TypeId::of::<T>())
            .and_then(|column| (**column).as_any_mut().downcast_mut::<Column<T>>())
    }

    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> Option<T> {
        self.register::<T>().insert(entity, value)
    }

    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.column_mut::<T>()?.remove(entity)
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.column::<T>()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.column_mut::<T>()?.get_mut(entity)
    }

    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.contains_type(TypeId::of::<T>(), entity)
    }

    pub fn contains_type(&self, ty: TypeId, entity: Entity) -> bool {
        self.columns
            .get(&ty)
            .map_or(false, |column| column.contains(entity))
    }

    /// Number of stored instances of `T`.
    pub fn len<T: Component>(&self) -> usize {
        self.columns
            .get(&TypeId::of::<T>())
            .map_or(0, |column| column.len())
    }

    pub fn is_controller<T: Component>(&self) -> bool {
        self.columns
            .get(&TypeId::of::<T>())
            .map_or(false, |column| column.is_controller())
    }

    pub fn type_name(&self, ty: TypeId) -> Option<&'static str> {
        self.columns.get(&ty).map(|column| column.type_name())
    }

    /// Entities holding every type in `types`, evaluated now.
    ///
    /// Walks the smallest requested column in dense order, so the result is
    /// stable for an unmutated store.
    pub fn matching(&self, types: &[TypeId]) -> Vec<Entity> {
        let mut columns = Vec::with_capacity(types.len());
        for ty in types {
            match self.columns.get(ty) {
                Some(column) => columns.push(column),
                None => return Vec::new(),
            }
        }
        let Some((smallest, _)) = columns
            .iter()
            .enumerate()
            .min_by_key(|(_, column)| column.len())
        else {
            return Vec::new();
        };

        columns[smallest]
            .entities()
            .iter()
            .copied()
            .filter(|entity| columns.iter().all(|column| column.contains(*entity)))
            .collect()
    }

    pub(crate) fn fire_detach(&mut self, ty: TypeId, entity: Entity) {
        if let Some(column) = self.columns.get_mut(&ty) {
            column.fire_detach(entity);
        }
    }

    pub(crate) fn drop_component(&mut self, ty: TypeId, entity: Entity) -> bool {
        self.columns
            .get_mut(&ty)
            .map_or(false, |column| column.drop_component(entity))
    }

    pub(crate) fn is_controller_type(&self, ty: TypeId) -> bool {
        self.columns
            .get(&ty)
            .map_or(false, |column| column.is_controller())
    }

    /// Run `on_update` for every controller instance: columns in registration
    /// order, instances in dense order.
    ///
    /// Each controller column is checked out of the store while it runs, so
    /// its hooks can read every other column.
    pub(crate) fn update_controllers(&mut self, world: WorldId, dt: f32, commands: &mut Commands) {
        for index in 0..self.order.len() {
            let ty = self.order[index];
            if !self.is_controller_type(ty) {
                continue;
            }
            let Some(mut column) = self.columns.remove(&ty) else {
                continue;
            };
            let mut ctx = UpdateContext::new(world, self, commands);
            column.update_controllers(dt, &mut ctx);
            self.columns.insert(ty, column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityRegistry;

    #[derive(Debug, PartialEq)]
    struct Position(i32);

    #[derive(Debug, PartialEq)]
    struct Velocity(i32);

    #[test]
    fn swap_remove_keeps_sparse_index_consistent() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let a = registry.create().unwrap();
        let b = registry.create().unwrap();
        let c = registry.create().unwrap();

        store.insert(a, Position(1));
        store.insert(b, Position(2));
        store.insert(c, Position(3));

        assert_eq!(store.remove::<Position>(a), Some(Position(1)));
        assert_eq!(store.get::<Position>(c), Some(&Position(3)));
        assert_eq!(store.get::<Position>(b), Some(&Position(2)));
        assert_eq!(store.len::<Position>(), 2);
        assert_eq!(store.remove::<Position>(a), None);
    }

    #[test]
    fn insert_replaces_existing_value() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let e = registry.create().unwrap();

        assert_eq!(store.insert(e, Position(1)), None);
        assert_eq!(store.insert(e, Position(5)), Some(Position(1)));
        assert_eq!(store.get::<Position>(e), Some(&Position(5)));
        assert_eq!(store.len::<Position>(), 1);
    }

    #[test]
    fn stale_handle_does_not_alias_recycled_slot() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let old = registry.create().unwrap();
        store.insert(old, Position(1));
        store.remove::<Position>(old);
        registry.delete(old).unwrap();

        let new = registry.create().unwrap();
        store.insert(new, Position(9));

        assert_eq!(new.index(), old.index());
        assert_eq!(store.get::<Position>(old), None);
        assert_eq!(store.get::<Position>(new), Some(&Position(9)));
    }

    #[test]
    fn matching_requires_every_type() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let a = registry.create().unwrap();
        let b = registry.create().unwrap();

        store.insert(a, Position(0));
        store.insert(a, Velocity(1));
        store.insert(b, Position(0));

        let both = [TypeId::of::<Position>(), TypeId::of::<Velocity>()];
        assert_eq!(store.matching(&both), vec![a]);
        assert_eq!(store.matching(&[TypeId::of::<Position>()]), vec![a, b]);
        assert!(store.matching(&[TypeId::of::<u8>()]).is_empty());
        assert!(store.matching(&[]).is_empty());
    }
}
