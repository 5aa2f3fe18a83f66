use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

/// A change to the contents of a document store.
pub enum DocumentEvent<D> {
    /// A document with a previously unseen key was stored.
    Loaded(Arc<D>),
    /// A stored document was replaced.
    Updated { new: Arc<D>, old: Arc<D> },
    /// A stored document was removed. Carries the instance that was stored.
    Deleted(Arc<D>),
}

impl<D> DocumentEvent<D> {
    /// What happened, without the payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Loaded(_) => EventKind::Loaded,
            Self::Updated { .. } => EventKind::Updated,
            Self::Deleted(_) => EventKind::Deleted,
        }
    }

    /// The document as it is after the event (before it, for deletions).
    pub fn document(&self) -> &Arc<D> {
        match self {
            Self::Loaded(doc) | Self::Deleted(doc) => doc,
            Self::Updated { new, .. } => new,
        }
    }
}

impl<D> Clone for DocumentEvent<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Loaded(doc) => Self::Loaded(Arc::clone(doc)),
            Self::Updated { new, old } => Self::Updated {
                new: Arc::clone(new),
                old: Arc::clone(old),
            },
            Self::Deleted(doc) => Self::Deleted(Arc::clone(doc)),
        }
    }
}

impl<D> fmt::Debug for DocumentEvent<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentEvent::{}", self.kind())
    }
}

/// Discriminant of a [`DocumentEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Loaded,
    Updated,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "Loaded",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Callback invoked synchronously for every event.
pub type EventHandler<D> = Arc<dyn Fn(&DocumentEvent<D>) + Send + Sync>;

/// A broadcast channel receiver for document events.
pub type EventStream<D> = broadcast::Receiver<DocumentEvent<D>>;

/// Handle returned by [`EventRouter::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of document events to handlers and broadcast channels.
///
/// Handlers run on the emitting thread, in subscription order, after the
/// handler list lock is released, so a handler may subscribe or unsubscribe.
/// Channels whose receivers are all dropped are pruned on the next emit.
pub struct EventRouter<D> {
    handlers: RwLock<Vec<(SubscriptionId, EventHandler<D>)>>,
    channels: Mutex<Vec<broadcast::Sender<DocumentEvent<D>>>>,
    next_id: AtomicU64,
}

impl<D> EventRouter<D> {
    /// A router with no subscribers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler called synchronously for every event.
    pub fn subscribe(&self, handler: EventHandler<D>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        handlers.len() != before
    }

    /// Open a broadcast channel that receives every subsequent event.
    pub fn channel(&self, capacity: usize) -> EventStream<D> {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        self.channels.lock().push(tx);
        rx
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Number of open broadcast channels.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Deliver `event` to every handler and channel.
    pub fn emit(&self, event: DocumentEvent<D>) {
        let handlers: Vec<EventHandler<D>> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in &handlers {
            handler(&event);
        }

        let mut channels = self.channels.lock();
        if !channels.is_empty() {
            // A failed send means every receiver is gone.
            channels.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl<D> Default for EventRouter<D> {
    fn default() -> Self {
        Self::new()
    }
}
