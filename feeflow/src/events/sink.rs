//! Event sink trait and implementations.

use super::OrchestratorEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Receives orchestrator events.
///
/// Implementations must not fail; errors are logged and suppressed.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: &OrchestratorEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &OrchestratorEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`. Anything above DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// An info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &OrchestratorEvent) {
        let data = serde_json::to_string(event).unwrap_or_default();
        if self.level == Level::DEBUG || self.level == Level::TRACE {
            debug!(
                event_type = event.event_type(),
                job = event.job_id(),
                event_data = %data,
                "Event: {}", event.event_type()
            );
        } else {
            info!(
                event_type = event.event_type(),
                job = event.job_id(),
                event_data = %data,
                "Event: {}", event.event_type()
            );
        }
    }
}

/// Keeps every event in memory. Used by tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<OrchestratorEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> Vec<OrchestratorEvent> {
        self.events.read().clone()
    }

    /// Events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<OrchestratorEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &OrchestratorEvent) {
        self.events.write().push(event.clone());
    }
}
