//! 2D spatial component
//!
//! `Transform2D` stores position, rotation (degrees, wrapped to `[0, 360)`)
//! and scale. Every setter notifies the transform's own subscribers, so
//! render or physics adapters can mirror changes without polling.

use crate::ecs::{EventDispatcher, HandlerId};
use glam::Vec2;

/// Change notification carrying the new value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TransformEvent {
    Position(Vec2),
    Rotation(f32),
    Scale(Vec2),
}

#[derive(Debug)]
pub struct Transform2D {
    position: Vec2,
    rotation: f32,
    scale: Vec2,
    events: EventDispatcher<TransformEvent>,
}

impl Transform2D {
    pub fn new(position: Vec2, rotation: f32, scale: Vec2) -> Self {
        Self {
            position,
            rotation: rotation.rem_euclid(360.0),
            scale,
            events: EventDispatcher::new(),
        }
    }

    pub fn from_position(position: Vec2) -> Self {
        Self::new(position, 0.0, Vec2::ONE)
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.events.emit(TransformEvent::Position(position));
    }

    pub fn translate(&mut self, offset: Vec2) {
        self.set_position(self.position + offset);
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = degrees.rem_euclid(360.0);
        self.events.emit(TransformEvent::Rotation(self.rotation));
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.set_rotation(self.rotation + degrees);
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
        self.events.emit(TransformEvent::Scale(scale));
    }

    /// Unit vector the transform is facing (rotation 0 faces +X).
    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.rotation.to_radians())
    }

    pub fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&TransformEvent) + Send + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::new(Vec2::ZERO, 0.0, Vec2::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::World;
    use std::sync::{Arc, Mutex};

    #[test]
    fn rotation_wraps() {
        let mut transform = Transform2D::new(Vec2::ZERO, 370.0, Vec2::ONE);
        assert!((transform.rotation() - 10.0).abs() < 1e-4);
        transform.rotate(-20.0);
        assert!((transform.rotation() - 350.0).abs() < 1e-4);
    }

    #[test]
    fn setters_notify_subscribers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut transform = Transform2D::default();
        transform.subscribe(move |event| sink.lock().unwrap().push(*event));

        transform.translate(Vec2::new(1.0, 2.0));
        transform.set_scale(Vec2::splat(2.0));
        transform.set_rotation(90.0);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                TransformEvent::Position(Vec2::new(1.0, 2.0)),
                TransformEvent::Scale(Vec2::splat(2.0)),
                TransformEvent::Rotation(90.0),
            ]
        );
    }

    #[test]
    fn lives_on_an_entity() {
        let mut world = World::new("spatial");
        let entity = world.create_entity().unwrap();
        world
            .add_component(entity, Transform2D::from_position(Vec2::X))
            .unwrap();

        world
            .get_component_mut::<Transform2D>(entity)
            .unwrap()
            .translate(Vec2::Y);
        assert_eq!(
            world.get_component::<Transform2D>(entity).unwrap().position(),
            Vec2::new(1.0, 1.0)
        );
    }
}
