use parking_lot::RwLock;
use std::sync::Arc;

/// Shutdown step observed by an in-memory adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A topic session finished closing.
    TopicClosed(String),
    /// The dead-letter router was closed.
    RouterClosed,
}

/// Ordered record of lifecycle events, shared between in-memory adapters.
#[derive(Debug, Clone, Default)]
pub struct LifecycleLog {
    events: Arc<RwLock<Vec<LifecycleEvent>>>,
}

impl LifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: LifecycleEvent) {
        self.events.write().push(event);
    }

    /// Events in the order they were recorded.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().clone()
    }
}
