//! Notifications a simulation raises during a step
//!
//! State changes (running, paused, empty) happen deep inside a step, where
//! the owner of the simulation cannot be called back. They are queued here in
//! the order they happened and collected by the driver between frames.

/// Ordered queue of notifications, collected with `drain`
#[derive(Debug)]
pub struct EventBus<E> {
    events: Vec<E>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: E) {
        self.events.push(event);
    }

    /// Take every queued notification, oldest first
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    /// Queued notifications, left in place
    pub fn pending(&self) -> &[E] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
