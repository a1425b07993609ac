// component.rs - Component and Controller capabilities
//
// Any `'static + Send` type can be stored as a component. Logic attaches to
// data through the separate `Controller` trait: its hooks are captured as
// function pointers when a type's column is registered as a controller
// column, so plain components never pay for lifecycle dispatch.

use crate::ecs::{Entity, UpdateContext, WorldId};
use std::any::Any;

/// Marker for types that can be attached to entities.
///
/// Blanket-implemented; components are plain Rust values.
pub trait Component: Any + Send {}

impl<T: Any + Send> Component for T {}

/// Downcasting helper for trait objects (processors, erased columns).
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A component with lifecycle hooks.
///
/// Register the type with [`World::add_controller`](crate::ecs::World::add_controller)
/// (or [`World::register_controller`](crate::ecs::World::register_controller)) so
/// the world knows to invoke the hooks:
/// - `on_attach` after the instance is stored on an entity,
/// - `on_detach` before it leaves storage (removal, replacement, entity deletion),
/// - `on_update` once per controller pass (see [`ControllerProcessor`](crate::ecs::ControllerProcessor)).
///
/// `on_update` can read other components through its [`UpdateContext`].
/// Structural changes go through [`UpdateContext::commands`] and are applied
/// after the pass.
pub trait Controller: Component {
    fn on_attach(&mut self, entity: Entity, world: WorldId) {
        let _ = (entity, world);
    }

    fn on_detach(&mut self, entity: Entity) {
        let _ = entity;
    }

    fn on_update(&mut self, entity: Entity, dt: f32, ctx: &mut UpdateContext<'_>) {
        let _ = (entity, dt, ctx);
    }
}

/// Lifecycle hooks captured from a `Controller` implementation.
pub(crate) struct ControllerHooks<T> {
    pub attach: fn(&mut T, Entity, WorldId),
    pub detach: fn(&mut T, Entity),
    pub update: fn(&mut T, Entity, f32, &mut UpdateContext<'_>),
}

impl<T: Controller> ControllerHooks<T> {
    pub fn of() -> Self {
        Self {
            attach: T::on_attach,
            detach: T::on_detach,
            update: T::on_update,
        }
    }
}

impl<T> Clone for ControllerHooks<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ControllerHooks<T> {}

/// Short type name used in errors and events (`game::Position` -> `Position`).
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) if !full.contains('<') => &full[pos + 2..],
        _ => full,
    }
}
