// query.rs - Snapshot queries over component type sets
//
// The matching entity set is computed once when the query is built. The query
// keeps a shared borrow of the component store, so the world cannot change
// underneath it and iteration can be restarted any number of times.

use crate::ecs::{Component, ComponentStore, Entity};
use std::any::TypeId;
use std::marker::PhantomData;

/// A tuple of component types that can be fetched together.
///
/// Implemented for tuples of one to six component types.
pub trait ComponentSet {
    type Item<'a>;

    fn type_ids() -> Vec<TypeId>;

    fn fetch<'a>(store: &'a ComponentStore, entity: Entity) -> Option<Self::Item<'a>>;
}

impl<A: Component> ComponentSet for (A,) {
    type Item<'a> = &'a A;

    fn type_ids() -> Vec<TypeId> {
        vec![TypeId::of::<A>()]
    }

    fn fetch<'a>(store: &'a ComponentStore, entity: Entity) -> Option<Self::Item<'a>> {
        store.get::<A>(entity)
    }
}

macro_rules! impl_component_set {
    ($($ty:ident),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            type Item<'a> = ($(&'a $ty,)+);

            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$ty>()),+]
            }

            fn fetch<'a>(store: &'a ComponentStore, entity: Entity) -> Option<Self::Item<'a>> {
                Some(($(store.get::<$ty>(entity)?,)+))
            }
        }
    };
}

impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);

/// Entities holding every component in `Q`, captured at creation.
pub struct Query<'w, Q: ComponentSet> {
    store: &'w ComponentStore,
    entities: Vec<Entity>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'w, Q: ComponentSet> Query<'w, Q> {
    pub(crate) fn new(store: &'w ComponentStore) -> Self {
        Self {
            store,
            entities: store.matching(&Q::type_ids()),
            _marker: PhantomData,
        }
    }

    pub fn iter(&self) -> QueryIter<'_, 'w, Q> {
        QueryIter {
            store: self.store,
            entities: self.entities.iter(),
            _marker: PhantomData,
        }
    }

    /// The captured entity set, in iteration order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<'q, 'w, Q: ComponentSet> IntoIterator for &'q Query<'w, Q> {
    type Item = (Entity, Q::Item<'w>);
    type IntoIter = QueryIter<'q, 'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct QueryIter<'q, 'w, Q: ComponentSet> {
    store: &'w ComponentStore,
    entities: std::slice::Iter<'q, Entity>,
    _marker: PhantomData<fn() -> Q>,
}

impl<'q, 'w, Q: ComponentSet> Iterator for QueryIter<'q, 'w, Q> {
    type Item = (Entity, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        for &entity in self.entities.by_ref() {
            if let Some(item) = Q::fetch(self.store, entity) {
                return Some((entity, item));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityRegistry;

    #[derive(Debug, PartialEq)]
    struct Pos(i32);
    #[derive(Debug, PartialEq)]
    struct Vel(i32);
    #[derive(Debug, PartialEq)]
    struct Tag;

    #[test]
    fn iterates_matching_entities_and_restarts() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let a = registry.create().unwrap();
        let b = registry.create().unwrap();
        let c = registry.create().unwrap();
        store.insert(a, Pos(1));
        store.insert(a, Vel(10));
        store.insert(b, Pos(2));
        store.insert(c, Pos(3));
        store.insert(c, Vel(30));
        store.insert(c, Tag);

        let query = Query::<(Pos, Vel)>::new(&store);
        let first: Vec<_> = query.iter().map(|(e, (p, v))| (e, p.0 + v.0)).collect();
        assert_eq!(first, vec![(a, 11), (c, 33)]);

        let second: Vec<Entity> = query.iter().map(|(e, _)| e).collect();
        assert_eq!(second, vec![a, c]);
        assert_eq!(query.len(), 2);
    }

    #[test]
    fn single_type_query_yields_plain_references() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let a = registry.create().unwrap();
        store.insert(a, Pos(4));

        let query = Query::<(Pos,)>::new(&store);
        let values: Vec<&Pos> = query.iter().map(|(_, pos)| pos).collect();
        assert_eq!(values, vec![&Pos(4)]);
    }

    #[test]
    fn six_type_query() {
        let mut registry = EntityRegistry::new();
        let mut store = ComponentStore::new();
        let e = registry.create().unwrap();
        store.insert(e, 1u8);
        store.insert(e, 2u16);
        store.insert(e, 3u32);
        store.insert(e, 4u64);
        store.insert(e, 5i8);
        store.insert(e, 6i16);

        let query = Query::<(u8, u16, u32, u64, i8, i16)>::new(&store);
        let (_, (a, _, _, _, _, f)) = query.iter().next().unwrap();
        assert_eq!((*a, *f), (1, 6));
    }

    #[test]
    fn missing_column_yields_nothing() {
        let store = ComponentStore::new();
        assert!(Query::<(Pos, Tag)>::new(&store).is_empty());
    }
}
