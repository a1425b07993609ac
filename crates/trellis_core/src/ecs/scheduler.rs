// scheduler.rs - Ordered processor registry with tick-safe removal
//
// Processors are checked out of their slot while they run so the world can be
// lent to them mutably. A checked-out slot that gets unregistered is only
// flagged; the processor is handed back for `on_unregister` when it returns.

use crate::ecs::{EcsError, Processor, ProcessorId, WorldId};
use std::any::TypeId;
use std::time::Duration;
use trellis_metrics::ProcessorProfiler;

struct Entry {
    id: ProcessorId,
    priority: i32,
    name: String,
    type_id: TypeId,
    processor: Option<Box<dyn Processor>>, // None while checked out
    removal_pending: bool,
}

/// Result of [`ProcessorScheduler::unregister`].
pub enum Unregistered {
    /// The processor was idle and has been taken out of the schedule.
    Removed(Box<dyn Processor>),
    /// The processor is running; it leaves the schedule when its update returns.
    Deferred,
}

pub struct ProcessorScheduler {
    entries: Vec<Entry>, // sorted by (priority, id)
    next_id: u64,
    running: Option<ProcessorId>,
    profiler: ProcessorProfiler,
}

impl ProcessorScheduler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            running: None,
            profiler: ProcessorProfiler::new(),
        }
    }

    /// Add a processor. It receives `on_register` immediately.
    pub fn register(
        &mut self,
        mut processor: Box<dyn Processor>,
        priority: i32,
        world: WorldId,
    ) -> ProcessorId {
        let id = ProcessorId::new(self.next_id);
        self.next_id += 1;

        processor.on_register(world);
        let name = processor.name().to_string();
        let type_id = (*processor).as_any().type_id();
        tracing::debug!(%id, name = %name, priority, "processor registered");

        let at = self.entries.partition_point(|entry| entry.priority <= priority);
        self.entries.insert(
            at,
            Entry {
                id,
                priority,
                name,
                type_id,
                processor: Some(processor),
                removal_pending: false,
            },
        );
        id
    }

    /// Remove a processor. `on_unregister` is the caller's responsibility for
    /// the returned box; deferred removals are returned from [`Self::checkin`].
    pub fn unregister(&mut self, id: ProcessorId) -> Result<Unregistered, EcsError> {
        let at = self
            .position(id)
            .ok_or(EcsError::NotRegistered { id })?;

        if self.entries[at].processor.is_none() {
            let entry = &mut self.entries[at];
            if entry.removal_pending {
                return Err(EcsError::NotRegistered { id });
            }
            entry.removal_pending = true;
            tracing::debug!(%id, name = %entry.name, "processor removal deferred until update returns");
            return Ok(Unregistered::Deferred);
        }

        let entry = self.entries.remove(at);
        tracing::debug!(%id, name = %entry.name, "processor unregistered");
        match entry.processor {
            Some(processor) => Ok(Unregistered::Removed(processor)),
            None => Err(EcsError::NotRegistered { id }),
        }
    }

    /// Snapshot of the execution order for one tick.
    pub fn begin_tick(&self) -> Vec<ProcessorId> {
        self.ids()
    }

    /// Take a processor out of its slot to run it. `None` if it was removed
    /// since the tick began.
    pub fn checkout(&mut self, id: ProcessorId) -> Option<Box<dyn Processor>> {
        let at = self.position(id)?;
        let processor = self.entries[at].processor.take()?;
        self.running = Some(id);
        Some(processor)
    }

    /// Return a processor after its update. Hands it back if its removal was
    /// requested while it ran.
    pub fn checkin(
        &mut self,
        id: ProcessorId,
        processor: Box<dyn Processor>,
        elapsed: Duration,
    ) -> Option<Box<dyn Processor>> {
        self.running = None;
        let Some(at) = self.position(id) else {
            return Some(processor);
        };

        self.profiler.record(&self.entries[at].name, elapsed);
        if self.entries[at].removal_pending {
            let entry = self.entries.remove(at);
            tracing::debug!(%id, name = %entry.name, "processor unregistered");
            return Some(processor);
        }

        self.entries[at].processor = Some(processor);
        None
    }

    /// Processor currently checked out for its update.
    pub fn running(&self) -> Option<ProcessorId> {
        self.running
    }

    /// Take every idle processor out of the schedule, in execution order.
    /// Checked-out processors are flagged for removal instead.
    pub fn drain(&mut self) -> Vec<(ProcessorId, Box<dyn Processor>)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        let mut kept = Vec::new();
        for mut entry in self.entries.drain(..) {
            match entry.processor.take() {
                Some(processor) => drained.push((entry.id, processor)),
                None => {
                    entry.removal_pending = true;
                    kept.push(entry);
                }
            }
        }
        self.entries = kept;
        drained
    }

    /// Find a registered, idle processor by concrete type.
    pub fn get<P: Processor>(&self) -> Option<&P> {
        self.entries.iter().find_map(|entry| {
            entry
                .processor
                .as_deref()
                .and_then(|processor| processor.as_any().downcast_ref::<P>())
        })
    }

    pub fn get_mut<P: Processor>(&mut self) -> Option<&mut P> {
        self.entries.iter_mut().find_map(|entry| {
            entry
                .processor
                .as_deref_mut()
                .and_then(|processor| processor.as_any_mut().downcast_mut::<P>())
        })
    }

    /// Id of the first registered processor of type `P`, including one that
    /// is checked out.
    pub fn id_of<P: Processor>(&self) -> Option<ProcessorId> {
        let wanted = TypeId::of::<P>();
        self.entries
            .iter()
            .find(|entry| entry.type_id == wanted)
            .map(|entry| entry.id)
    }

    pub fn name_of(&self, id: ProcessorId) -> Option<&str> {
        self.position(id).map(|at| self.entries[at].name.as_str())
    }

    /// Registered ids in execution order.
    pub fn ids(&self) -> Vec<ProcessorId> {
        self.entries
            .iter()
            .filter(|entry| !entry.removal_pending)
            .map(|entry| entry.id)
            .collect()
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.position(id)
            .map_or(false, |at| !self.entries[at].removal_pending)
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.removal_pending)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn profiler(&self) -> &ProcessorProfiler {
        &self.profiler
    }

    fn position(&self, id: ProcessorId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }
}

impl Default for ProcessorScheduler {
    fn default() -> Self {
        Self::new()
    }
}
