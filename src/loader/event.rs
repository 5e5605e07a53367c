//! Lifecycle events and the priority-ordered listener list.
//!
//! Listeners run synchronously, in priority order, on the thread that
//! mutates the loader. There is no concurrent dispatch: the single-writer
//! model keeps the registry purge ordered before any consumer reaction.

use std::path::PathBuf;

/// Lifecycle events emitted by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    /// A unit's top-level code executed successfully and it is now tracked.
    UnitLoaded(PathBuf),
    /// A unit was removed from tracking. Emitted even for paths that were
    /// not tracked, so dependent purges are unconditional.
    UnitUnloaded(PathBuf),
    /// A whole-project reload is beginning; stale catalog state must go.
    ReloadStarted(PathBuf),
    /// A whole-project reload finished.
    ReloadEnded(PathBuf),
}

/// Listener invocation order, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Highest,
    High,
    AboveNormal,
    Normal,
    BelowNormal,
    Low,
    Lowest,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

struct Listener {
    priority: Priority,
    callback: Box<dyn FnMut(&LoaderEvent)>,
}

/// Explicit listener list with a stable priority sort.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners with equal priority run in
    /// subscription order.
    pub fn subscribe(&mut self, priority: Priority, callback: impl FnMut(&LoaderEvent) + 'static) {
        self.listeners.push(Listener {
            priority,
            callback: Box::new(callback),
        });
        self.listeners.sort_by_key(|l| l.priority);
    }

    /// Invoke every listener with `event`, in priority order.
    pub fn emit(&mut self, event: &LoaderEvent) {
        for listener in &mut self.listeners {
            (listener.callback)(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_listeners_run_in_priority_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let o = order.clone();
        bus.subscribe(Priority::Low, move |_| o.borrow_mut().push("low"));
        let o = order.clone();
        bus.subscribe(Priority::Highest, move |_| o.borrow_mut().push("highest"));
        let o = order.clone();
        bus.subscribe(Priority::Normal, move |_| o.borrow_mut().push("normal"));

        bus.emit(&LoaderEvent::ReloadEnded("x".into()));
        assert_eq!(*order.borrow(), vec!["highest", "normal", "low"]);
    }

    #[test]
    fn test_equal_priority_keeps_subscription_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        for name in ["first", "second", "third"] {
            let o = order.clone();
            bus.subscribe(Priority::Normal, move |_| o.borrow_mut().push(name));
        }

        bus.emit(&LoaderEvent::ReloadStarted("x".into()));
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }
}
