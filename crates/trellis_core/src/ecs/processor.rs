use crate::ecs::component::short_type_name;
use crate::ecs::{AsAny, EcsError, World, WorldId};
use std::fmt;
use thiserror::Error;

/// Handle assigned to each registered processor.
///
/// Ids are unique per world and never reused, so they double as the
/// registration sequence used to break priority ties.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(u64);

impl ProcessorId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of logic run once per world tick.
///
/// Lower priorities run first; equal priorities run in registration order.
pub trait Processor: AsAny + Send {
    /// Display name used in logs and failure reports.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Called once when the processor joins a world.
    fn on_register(&mut self, world: WorldId) {
        let _ = world;
    }

    /// Called once when the processor leaves its world (explicit removal,
    /// world clear or world drop).
    fn on_unregister(&mut self) {}

    fn update(&mut self, world: &mut World, dt: f32) -> Result<(), ProcessorError>;
}

/// Error returned by [`Processor::update`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProcessorError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ProcessorError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EcsError> for ProcessorError {
    fn from(error: EcsError) -> Self {
        Self::from_error(error)
    }
}

/// A processor update that returned an error during a tick.
#[derive(Debug, Error)]
#[error("processor '{name}' ({processor}) failed: {source}")]
pub struct ProcessorUpdateFailed {
    pub processor: ProcessorId,
    pub name: String,
    #[source]
    pub source: ProcessorError,
}

/// Outcome of one world tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub dt: f32,
    /// Number of processors whose update ran.
    pub ran: usize,
    pub failures: Vec<ProcessorUpdateFailed>,
}

impl TickReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}
