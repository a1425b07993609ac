//! Entity Component System core types.
//!
//! A [`World`] owns three pieces that it keeps consistent with each other:
//! - [`EntityRegistry`]: generation-tagged entity allocation and per-entity
//!   component bookkeeping,
//! - [`ComponentStore`]: one sparse-set column per component type,
//! - [`ProcessorScheduler`]: the ordered set of processors run by `tick`.
//!
//! Controllers are components with lifecycle hooks; [`ControllerProcessor`]
//! drives their per-tick updates. [`TaskProcessor`] runs resumable tasks.

mod commands;
mod component;
mod controllers;
mod entity;
mod error;
mod events;
mod processor;
mod query;
mod registry;
mod scheduler;
mod store;
mod tasks;
mod world;

pub use commands::{Commands, UpdateContext};
pub use component::{AsAny, Component, Controller};
pub use controllers::ControllerProcessor;
pub use entity::Entity;
pub use error::EcsError;
pub use events::{EventDispatcher, HandlerId, WorldEvent};
pub use processor::{
    Processor, ProcessorError, ProcessorId, ProcessorUpdateFailed, TickReport,
};
pub use query::{ComponentSet, Query, QueryIter};
pub use registry::EntityRegistry;
pub use scheduler::{ProcessorScheduler, Unregistered};
pub use store::{Column, ComponentStore};
pub use tasks::{Task, TaskId, TaskProcessor, TaskState, TaskStep};
pub use world::{Enter, LoopRequest, Retire, World, WorldId};
