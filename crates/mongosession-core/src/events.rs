//! Connection Events and Broadcasting
//!
//! Every state transition is published as a typed `ConnectionEvent`. Listeners
//! register synchronously for a single `EventKind` and are invoked in
//! registration order, in the exact order events are emitted. Nothing is
//! buffered or dropped on the listener path; channel subscribers receive every
//! event through an unbounded queue.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::connection::{ConnectedState, ConnectionState, ErroredState};

// ----------------------------------------------------------------------------
// Event Types
// ----------------------------------------------------------------------------

/// A connection lifecycle transition
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// An attempt is starting, or an interactive flow changed while connecting
    Requested(ConnectionState),
    /// Handshake verified
    Succeeded(ConnectedState),
    /// Handshake exceeded its time bound
    TimedOut(ErroredState),
    /// Connection closed
    Closed,
    /// Connect or handshake failed
    Errored(ErroredState),
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::Requested(_) => EventKind::Requested,
            ConnectionEvent::Succeeded(_) => EventKind::Succeeded,
            ConnectionEvent::TimedOut(_) => EventKind::TimedOut,
            ConnectionEvent::Closed => EventKind::Closed,
            ConnectionEvent::Errored(_) => EventKind::Errored,
        }
    }

    /// Whether the event ends a connect attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::Succeeded(_) | ConnectionEvent::TimedOut(_) | ConnectionEvent::Errored(_)
        )
    }
}

/// Discriminant of a `ConnectionEvent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Requested,
    Succeeded,
    TimedOut,
    Closed,
    Errored,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Requested,
        EventKind::Succeeded,
        EventKind::TimedOut,
        EventKind::Closed,
        EventKind::Errored,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Requested => write!(f, "connection-requested"),
            EventKind::Succeeded => write!(f, "connection-succeeded"),
            EventKind::TimedOut => write!(f, "connection-time-out"),
            EventKind::Closed => write!(f, "connection-closed"),
            EventKind::Errored => write!(f, "connection-errored"),
        }
    }
}

// ----------------------------------------------------------------------------
// Listener Registration
// ----------------------------------------------------------------------------

/// Trait for observing connection events.
///
/// Handlers run synchronously on the emitting task and must not block or
/// emit events themselves.
pub trait ConnectionEventHandler: Send + Sync {
    fn handle_event(&self, event: &ConnectionEvent);
}

impl<F> ConnectionEventHandler for F
where
    F: Fn(&ConnectionEvent) + Send + Sync,
{
    fn handle_event(&self, event: &ConnectionEvent) {
        self(event)
    }
}

/// Registration returned by `EventBroadcaster::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    kind: EventKind,
    handler: Arc<dyn ConnectionEventHandler>,
}

struct BroadcasterInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener>>,
    channels: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
}

// ----------------------------------------------------------------------------
// Event Broadcaster
// ----------------------------------------------------------------------------

/// Typed publish/subscribe channel keyed by event kind
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
                channels: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a handler for one event kind. The handler observes every
    /// event of that kind emitted after this call returns.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn ConnectionEventHandler>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.push(Listener { id, kind, handler });
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    /// Receive every event, of every kind, through an unbounded channel.
    /// The subscription ends when the receiver is dropped.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Deliver an event to every matching listener, then to channel subscribers
    pub fn emit(&self, event: ConnectionEvent) {
        let kind = event.kind();

        // Handlers run outside the lock so they may subscribe or unsubscribe
        let handlers: Vec<Arc<dyn ConnectionEventHandler>> = {
            let listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners
                .iter()
                .filter(|listener| listener.kind == kind)
                .map(|listener| Arc::clone(&listener.handler))
                .collect()
        };

        for handler in handlers {
            handler.handle_event(&event);
        }

        let mut channels = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered listeners, excluding channel subscribers
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
