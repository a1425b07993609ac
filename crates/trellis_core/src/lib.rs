//! Trellis Core
//!
//! The logic layer of the engine:
//! - Entity Component System (entities, components, controllers, processors)
//! - World events and resumable tasks
//! - Fixed-step simulation time
//! - 2D transforms

pub mod ecs;
pub mod spatial;
pub mod time;

pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
