//! Event System
//!
//! Provides a pub/sub event bus announcing resource index changes to
//! interested parties (render pipeline, class loaders, tooling).

use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Events emitted by the resource index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A preview session was opened for a project
    SessionOpened { project: String },
    /// The preview session was closed
    SessionClosed { project: String },
    /// Items of a source were added or removed incrementally
    SourceChanged { source: String, added: usize, removed: usize },
    /// A source was repopulated wholesale
    SourceRescanned { source: String, items: usize },
    /// A source was dropped from the project
    SourceRemoved { source: String },
    /// A merged layer was rebuilt and swapped in
    LayerRecomputed { layer: String, generation: u64 },
    /// Dynamic resource ids were reset
    IdsReset { generation: u64 },
    /// A module repository was (re)built
    RepositoryBuilt { module: String, layers: usize, failures: usize },
    /// A module repository was dropped because its dependency graph changed
    RepositoryInvalidated { module: String },
    /// A shared library layer was explicitly evicted
    LibraryEvicted { location: String },
    /// An R class generator was associated with a package
    PackageRegistered { package: String },
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event that is already queued
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<(u64, Sender<Event>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, sender));
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers
    ///
    /// Subscribers whose receiving end has been dropped are pruned.
    pub fn emit(&self, event: Event) -> usize {
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for (id, sender) in subscribers.iter() {
                if sender.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    disconnected.push(*id);
                }
            }
        }

        if !disconnected.is_empty() {
            self.subscribers
                .write()
                .retain(|(id, _)| !disconnected.contains(id));
        }

        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
