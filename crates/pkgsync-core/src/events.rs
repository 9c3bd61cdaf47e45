//! Progress events emitted while syncing.
//!
//! Library code reports through an [`EventSink`]; each frontend decides how
//! to render them.

use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc, Mutex,
};

use crate::queue::Lane;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    PackageSynced {
        registry: String,
        name: String,
        new_versions: usize,
        new_dependencies: usize,
    },
    PackageNotFound {
        registry: String,
        name: String,
    },
    PackageFailed {
        registry: String,
        name: String,
        error: String,
    },
    /// Emitted after every name of a batch sync, successful or not.
    BatchProgress {
        registry: String,
        completed: usize,
        total: usize,
        failed: usize,
    },
    TasksEnqueued {
        lane: Lane,
        count: usize,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

pub type EventSinkHandle = Arc<dyn EventSink>;

/// Forwards events over a std mpsc channel.
pub struct ChannelSink {
    sender: Sender<SyncEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<SyncEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SyncEvent) {}
}

/// Stores every event for later inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
