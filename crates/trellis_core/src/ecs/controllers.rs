use crate::ecs::{Processor, ProcessorError, World};

/// Runs every controller's `on_update` once per tick.
///
/// Register it like any other processor; its priority decides where the
/// controller pass sits relative to the rest of the schedule.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControllerProcessor;

impl Processor for ControllerProcessor {
    fn update(&mut self, world: &mut World, dt: f32) -> Result<(), ProcessorError> {
        world.update_controllers(dt).map_err(ProcessorError::from)
    }
}
