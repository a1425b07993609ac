//! World event dispatch
//!
//! Handlers subscribe to a typed event stream. Dispatch can be switched off
//! (worlds that are resident but not active); events emitted meanwhile are
//! queued and delivered in emission order once dispatch is re-enabled.
//! Events emitted while nobody is subscribed are dropped.

use crate::ecs::{Entity, ProcessorId, WorldId};
use std::collections::VecDeque;
use std::fmt;

/// Token returned by [`EventDispatcher::subscribe`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send>;

pub struct EventDispatcher<E> {
    handlers: Vec<(HandlerId, Handler<E>)>,
    queue: VecDeque<E>,
    enabled: bool,
    next_handler: u64,
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            queue: VecDeque::new(),
            enabled: true,
            next_handler: 0,
        }
    }

    pub fn subscribe<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns `false` if the handler was not subscribed.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler, _)| *handler != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: E) {
        if self.handlers.is_empty() {
            return;
        }
        if self.enabled {
            self.deliver(&event);
        } else {
            self.queue.push_back(event);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle delivery. Enabling flushes the queue in order.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            while let Some(event) = self.queue.pop_front() {
                self.deliver(&event);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Drop every handler and queued event.
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.queue.clear();
    }

    fn deliver(&mut self, event: &E) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .field("pending", &self.queue.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Lifecycle notifications emitted by a [`World`](crate::ecs::World).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    EntityCreated(Entity),
    EntityDeleted(Entity),
    ComponentAdded {
        entity: Entity,
        component: &'static str,
    },
    ComponentRemoved {
        entity: Entity,
        component: &'static str,
    },
    ProcessorAdded {
        id: ProcessorId,
        name: String,
    },
    ProcessorRemoved {
        id: ProcessorId,
        name: String,
    },
    /// Emitted on the outgoing world before it is kept or discarded.
    SwitchedOut { from: WorldId, to: WorldId },
    /// Emitted on the incoming world. `from` is `None` for the first activation.
    SwitchedIn { from: Option<WorldId>, to: WorldId },
    /// Emitted on the active world when it asked the driver to quit.
    Quit,
    Custom(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (EventDispatcher<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        let sink = Arc::clone(&seen);
        dispatcher.subscribe(move |event: &u32| sink.lock().unwrap().push(*event));
        (dispatcher, seen)
    }

    #[test]
    fn delivers_immediately_when_enabled() {
        let (mut dispatcher, seen) = recording();
        dispatcher.emit(1);
        dispatcher.emit(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn buffers_while_disabled_and_flushes_in_order() {
        let (mut dispatcher, seen) = recording();
        dispatcher.set_enabled(false);
        dispatcher.emit(1);
        dispatcher.emit(2);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(dispatcher.pending(), 2);

        dispatcher.set_enabled(true);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn events_without_handlers_are_dropped() {
        let mut dispatcher = EventDispatcher::<u32>::new();
        dispatcher.set_enabled(false);
        dispatcher.emit(7);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let seen = Arc::new(Mutex::new(0));
        let mut dispatcher = EventDispatcher::new();
        let sink = Arc::clone(&seen);
        let id = dispatcher.subscribe(move |_: &()| *sink.lock().unwrap() += 1);

        dispatcher.emit(());
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.emit(());
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
