//! Resumable tasks driven by a processor
//!
//! A task is resumed once per tick until it reports [`TaskStep::Done`]. It can
//! also park itself for an amount of simulated time with [`TaskStep::Wait`];
//! parked tasks are woken in deadline order and resumed on the tick that
//! reaches their deadline.

use crate::ecs::{Processor, ProcessorError, World};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;

/// What a task wants after being resumed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TaskStep {
    /// Resume again next tick.
    Yield,
    /// Sleep for the given number of simulated seconds. Non-positive values
    /// behave like `Yield`.
    Wait(f32),
    /// Finished; drop the task.
    Done,
}

pub trait Task: Send + 'static {
    fn resume(&mut self, world: &mut World, dt: f32) -> TaskStep;
}

impl<F> Task for F
where
    F: FnMut(&mut World, f32) -> TaskStep + Send + 'static,
{
    fn resume(&mut self, world: &mut World, dt: f32) -> TaskStep {
        self(world, dt)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Active,
    Waiting,
}

struct Parked {
    wake_at: f64,
    seq: u64,
    id: TaskId,
    task: Box<dyn Task>,
}

// Min-heap on (wake_at, seq).
impl Ord for Parked {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wake_at
            .total_cmp(&self.wake_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Parked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Parked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Parked {}

/// Processor that owns and resumes tasks.
///
/// The wait clock only advances while at least one task is parked and
/// restarts from zero once none are.
#[derive(Default)]
pub struct TaskProcessor {
    next_id: u64,
    seq: u64,
    active: VecDeque<(TaskId, Box<dyn Task>)>,
    parked: BinaryHeap<Parked>,
    clock: f64,
}

impl TaskProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task; it is first resumed on the next update.
    pub fn start<T: Task>(&mut self, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.active.push_back((id, Box::new(task)));
        tracing::trace!(%id, "task started");
        id
    }

    /// Stop a task and hand it back. Returns `None` if it already finished or
    /// was never started here.
    pub fn kill(&mut self, id: TaskId) -> Option<Box<dyn Task>> {
        if let Some(at) = self.active.iter().position(|(task, _)| *task == id) {
            return self.active.remove(at).map(|(_, task)| task);
        }

        let mut parked = std::mem::take(&mut self.parked).into_vec();
        let found = parked
            .iter()
            .position(|entry| entry.id == id)
            .map(|at| parked.swap_remove(at).task);
        self.parked = parked.into();
        found
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        if self.active.iter().any(|(task, _)| *task == id) {
            Some(TaskState::Active)
        } else if self.parked.iter().any(|entry| entry.id == id) {
            Some(TaskState::Waiting)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wake_due(&mut self, dt: f32) {
        if self.parked.is_empty() {
            return;
        }

        self.clock += f64::from(dt);
        while self
            .parked
            .peek()
            .map_or(false, |entry| self.clock >= entry.wake_at)
        {
            if let Some(entry) = self.parked.pop() {
                self.active.push_back((entry.id, entry.task));
            }
        }
        if self.parked.is_empty() {
            self.clock = 0.0;
        }
    }

    fn park(&mut self, id: TaskId, task: Box<dyn Task>, seconds: f32) {
        let seq = self.seq;
        self.seq += 1;
        self.parked.push(Parked {
            wake_at: self.clock + f64::from(seconds),
            seq,
            id,
            task,
        });
    }
}

impl Processor for TaskProcessor {
    fn update(&mut self, world: &mut World, dt: f32) -> Result<(), ProcessorError> {
        self.wake_due(dt);

        for _ in 0..self.active.len() {
            let Some((id, mut task)) = self.active.pop_front() else {
                break;
            };
            match task.resume(world, dt) {
                TaskStep::Wait(seconds) if seconds > 0.0 => self.park(id, task, seconds),
                TaskStep::Yield | TaskStep::Wait(_) => self.active.push_back((id, task)),
                TaskStep::Done => tracing::trace!(%id, "task finished"),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("active", &self.active.len())
            .field("parked", &self.parked.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn counter() -> (Arc<Mutex<u32>>, impl FnMut(&mut World, f32) -> TaskStep + Send) {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        (count, move |_: &mut World, _: f32| {
            *sink.lock().unwrap() += 1;
            TaskStep::Yield
        })
    }

    #[test]
    fn yielding_task_runs_every_tick() {
        let mut world = World::new("tasks");
        let mut tasks = TaskProcessor::new();
        let (count, task) = counter();
        let id = tasks.start(task);

        for _ in 0..3 {
            tasks.update(&mut world, 0.1).unwrap();
        }
        assert_eq!(*count.lock().unwrap(), 3);
        assert_eq!(tasks.state(id), Some(TaskState::Active));
    }

    #[test]
    fn waiting_task_resumes_when_deadline_is_reached() {
        let mut world = World::new("tasks");
        let mut tasks = TaskProcessor::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let mut step = 0;
        let id = tasks.start(move |_: &mut World, _: f32| {
            step += 1;
            sink.lock().unwrap().push(step);
            match step {
                1 => TaskStep::Wait(0.5),
                _ => TaskStep::Done,
            }
        });

        tasks.update(&mut world, 0.25).unwrap(); // runs, parks until 0.5
        assert_eq!(tasks.state(id), Some(TaskState::Waiting));
        tasks.update(&mut world, 0.25).unwrap(); // clock 0.25
        assert_eq!(*log.lock().unwrap(), vec![1]);
        tasks.update(&mut world, 0.25).unwrap(); // clock 0.5, woken and resumed
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(tasks.state(id), None);
        assert!(tasks.is_empty());
    }

    fn wait_once(seconds: f32) -> impl FnMut(&mut World, f32) -> TaskStep + Send {
        let mut first = true;
        move |_: &mut World, _: f32| {
            if std::mem::take(&mut first) {
                TaskStep::Wait(seconds)
            } else {
                TaskStep::Done
            }
        }
    }

    #[test]
    fn clock_runs_only_while_something_waits() {
        let mut world = World::new("tasks");
        let mut tasks = TaskProcessor::new();
        tasks.start(wait_once(10.0));
        tasks.start(wait_once(0.1));

        tasks.update(&mut world, 1.0).unwrap(); // both park
        assert_eq!(tasks.clock, 0.0);
        tasks.update(&mut world, 1.0).unwrap(); // short one wakes and finishes
        assert_eq!(tasks.clock, 1.0);
        assert_eq!(tasks.len(), 1);

        let mut single = TaskProcessor::new();
        single.start(wait_once(0.1));
        single.update(&mut world, 1.0).unwrap();
        single.update(&mut world, 1.0).unwrap();
        assert_eq!(single.clock, 0.0);
        assert!(single.is_empty());
    }

    #[test]
    fn kill_removes_active_and_parked_tasks() {
        let mut world = World::new("tasks");
        let mut tasks = TaskProcessor::new();
        let (count, task) = counter();
        let active = tasks.start(task);
        let parked = tasks.start(|_: &mut World, _: f32| TaskStep::Wait(10.0));
        tasks.update(&mut world, 0.1).unwrap();

        assert!(tasks.kill(active).is_some());
        assert!(tasks.kill(parked).is_some());
        assert!(tasks.kill(parked).is_none());
        tasks.update(&mut world, 0.1).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(tasks.is_empty());
    }

    #[test]
    fn tasks_mutate_the_world() {
        let mut world = World::new("tasks");
        let mut tasks = TaskProcessor::new();
        tasks.start(|world: &mut World, _: f32| match world.create_entity() {
            Ok(_) if world.entity_count() < 3 => TaskStep::Yield,
            _ => TaskStep::Done,
        });

        for _ in 0..5 {
            tasks.update(&mut world, 0.1).unwrap();
        }
        assert_eq!(world.entity_count(), 3);
    }
}
