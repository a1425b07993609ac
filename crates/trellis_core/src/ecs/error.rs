use crate::ecs::{Entity, ProcessorId};
use thiserror::Error;

/// Errors raised by entity, component and processor bookkeeping.
///
/// These are programming errors: callers get them back immediately rather
/// than having the world silently carry on with a corrupted logic graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EcsError {
    #[error("entity {entity} is not alive")]
    UnknownEntity { entity: Entity },

    #[error("entity {entity} has no '{component}' component")]
    ComponentNotFound {
        entity: Entity,
        component: &'static str,
    },

    #[error("entity capacity of {capacity} slots exhausted")]
    CapacityExceeded { capacity: u32 },

    #[error("processor {id} is not registered")]
    NotRegistered { id: ProcessorId },
}
