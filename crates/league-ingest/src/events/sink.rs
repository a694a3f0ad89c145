//! Event sink trait and implementations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::IngestEvent;

/// Receives ingestion events.
///
/// `emit()` is called inline on the fetch path, so it must be fast and must
/// not block. Emission is best-effort; a sink failing to deliver never
/// affects ingestion.
pub trait IngestEventSink: Send + Sync {
    fn emit(&self, event: IngestEvent);

    fn emit_batch(&self, events: Vec<IngestEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Discards every event.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl IngestEventSink for NoOpEventSink {
    fn emit(&self, _event: IngestEvent) {}
}

/// Collects events for assertions.
#[derive(Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<IngestEvent>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IngestEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl IngestEventSink for MockEventSink {
    fn emit(&self, event: IngestEvent) {
        self.lock().push(event);
    }
}

/// Publishes events on an unbounded channel.
///
/// Cheap to clone. Events sent after the receiver is dropped are discarded.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<IngestEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<IngestEvent>) -> Self {
        Self { tx }
    }

    /// A sink and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<IngestEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl IngestEventSink for ChannelEventSink {
    fn emit(&self, event: IngestEvent) {
        // Receiver may be gone
        let _ = self.tx.send(event);
    }
}

/// Forwards every event to each inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn IngestEventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn IngestEventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn IngestEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl IngestEventSink for FanoutSink {
    fn emit(&self, event: IngestEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
