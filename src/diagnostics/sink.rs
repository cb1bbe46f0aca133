use std::sync::Mutex;

use tokio::sync::mpsc;

use super::events::{DiagnosticEvent, EventId};

/// Receiver of structured diagnostic events.
///
/// Sinks are invoked synchronously on the thread running the operation, so
/// implementations should hand events off quickly.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: &DiagnosticEvent);
}

/// Sink that records every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn event_ids(&self) -> Vec<EventId> {
        self.events().iter().map(DiagnosticEvent::event_id).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: &DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Sink forwarding events over an unbounded channel so a listener task can consume them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<DiagnosticEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DiagnosticEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DiagnosticSink for ChannelSink {
    fn emit(&self, event: &DiagnosticEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(event.clone());
    }
}
