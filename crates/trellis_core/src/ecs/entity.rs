//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that key component storage in a World.
//! The generation counter makes a handle captured before a delete/recycle cycle
//! distinguishable from the entity that later reuses the same slot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: Slot in the world's entity registry
/// - Generation: Incremented when the slot is freed (stale handles stop matching)
///
/// Example:
/// ```ignore
/// let entity = world.create_entity()?;
/// world.delete_entity(entity)?;
/// assert!(!world.is_alive(entity)); // generation mismatch
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer (for logs/save files)
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}
