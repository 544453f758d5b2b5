//! Reactive projections over the connection event stream
//!
//! A `ReactiveProjection` folds the events it subscribes to into a value of
//! type `V` and tells a `ProjectionSink` that its rendered content changed.
//! Folding happens synchronously on the broadcasting task, so `render()`
//! always reflects every event emitted so far. Sink notification runs on a
//! dedicated task; its failures are logged and never reach the broadcaster.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::errors::{CoreError, Result, SinkError};
use crate::events::{ConnectionEvent, EventBroadcaster, EventKind, ListenerId};

/// Pure fold of an event into the previous projection value
pub type FoldFn<V> = Arc<dyn Fn(&ConnectionEvent, &V) -> V + Send + Sync>;

/// Render a projection value for consumers
pub type RenderFn<V> = Arc<dyn Fn(&V) -> String + Send + Sync>;

// ----------------------------------------------------------------------------
// Projection Sink
// ----------------------------------------------------------------------------

/// Downstream receiver of "content changed" notifications
#[async_trait]
pub trait ProjectionSink: Send + Sync {
    async fn notify_changed(&self, uri: &str) -> core::result::Result<(), SinkError>;
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Builder for `ReactiveProjection`
pub struct ProjectionBuilder<V> {
    name: String,
    uri: String,
    initial: V,
    events: Vec<EventKind>,
    fold: Option<FoldFn<V>>,
    render: Option<RenderFn<V>>,
    sink: Option<Arc<dyn ProjectionSink>>,
}

impl<V> ProjectionBuilder<V>
where
    V: Send + Sync + 'static,
{
    pub fn new<N: Into<String>, U: Into<String>>(name: N, uri: U, initial: V) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            initial,
            events: Vec::new(),
            fold: None,
            render: None,
            sink: None,
        }
    }

    /// Event kinds to observe, in subscription order
    pub fn events<I: IntoIterator<Item = EventKind>>(mut self, events: I) -> Self {
        self.events = events.into_iter().collect();
        self
    }

    pub fn fold<F>(mut self, fold: F) -> Self
    where
        F: Fn(&ConnectionEvent, &V) -> V + Send + Sync + 'static,
    {
        self.fold = Some(Arc::new(fold));
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&V) -> String + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ProjectionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register with the broadcaster. Must be called within a tokio runtime.
    ///
    /// Listener registration completes before this returns, so no event
    /// emitted afterwards is missed.
    pub fn attach(self, broadcaster: &EventBroadcaster) -> Result<ReactiveProjection<V>> {
        let fold = self
            .fold
            .ok_or_else(|| CoreError::config_error(format!("projection {} has no fold", self.name)))?;
        let render = self
            .render
            .ok_or_else(|| CoreError::config_error(format!("projection {} has no renderer", self.name)))?;
        if self.events.is_empty() {
            return Err(CoreError::config_error(format!(
                "projection {} subscribes to no events",
                self.name
            )));
        }

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ProjectionShared {
            name: self.name,
            uri: self.uri,
            value: RwLock::new(self.initial),
            fold,
            render,
            notify_tx,
        });

        if let Some(sink) = self.sink {
            tokio::spawn(run_notifier(
                shared.name.clone(),
                shared.uri.clone(),
                sink,
                notify_rx,
            ));
        }

        let mut listeners = Vec::with_capacity(self.events.len());
        for kind in self.events {
            let observer = Arc::clone(&shared);
            let id = broadcaster.subscribe(
                kind,
                Arc::new(move |event: &ConnectionEvent| observer.observe(event)),
            );
            listeners.push(id);
        }

        Ok(ReactiveProjection {
            shared,
            broadcaster: broadcaster.clone(),
            listeners: Mutex::new(listeners),
        })
    }
}

// ----------------------------------------------------------------------------
// Reactive Projection
// ----------------------------------------------------------------------------

struct ProjectionShared<V> {
    name: String,
    uri: String,
    value: RwLock<V>,
    fold: FoldFn<V>,
    render: RenderFn<V>,
    notify_tx: mpsc::UnboundedSender<()>,
}

impl<V> ProjectionShared<V> {
    fn observe(&self, event: &ConnectionEvent) {
        {
            let mut value = self
                .value
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let next = (self.fold)(event, &*value);
            *value = next;
        }
        trace!(projection = %self.name, event = %event.kind(), "Projection updated");

        // Fails only when no sink was attached
        let _ = self.notify_tx.send(());
    }
}

/// Runs until the projection is dropped and its sender with it
async fn run_notifier(
    name: String,
    uri: String,
    sink: Arc<dyn ProjectionSink>,
    mut notify_rx: mpsc::UnboundedReceiver<()>,
) {
    while notify_rx.recv().await.is_some() {
        if let Err(err) = sink.notify_changed(&uri).await {
            warn!(
                projection = %name,
                uri = %uri,
                error = %err,
                "Failed to send resource update notification"
            );
        }
    }
}

/// An independent observer maintaining a derived view of the connection
pub struct ReactiveProjection<V> {
    shared: Arc<ProjectionShared<V>>,
    broadcaster: EventBroadcaster,
    listeners: Mutex<Vec<ListenerId>>,
}

impl<V> ReactiveProjection<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn builder<N: Into<String>, U: Into<String>>(
        name: N,
        uri: U,
        initial: V,
    ) -> ProjectionBuilder<V> {
        ProjectionBuilder::new(name, uri, initial)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn uri(&self) -> &str {
        &self.shared.uri
    }

    /// Snapshot of the current value
    pub fn value(&self) -> V {
        self.shared
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Render the current value. Never waits on a pending notification.
    pub fn render(&self) -> String {
        let value = self
            .shared
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (self.shared.render)(&*value)
    }

    /// Stop observing events. The value stays readable.
    pub fn close(&self) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for id in listeners.drain(..) {
            self.broadcaster.unsubscribe(id);
        }
    }
}

impl<V> Drop for ReactiveProjection<V> {
    fn drop(&mut self) {
        let listeners = self
            .listeners
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for id in listeners.drain(..) {
            self.broadcaster.unsubscribe(id);
        }
    }
}

// ----------------------------------------------------------------------------
// Renderer Trait
// ----------------------------------------------------------------------------

/// Object-safe view of a projection, used by resource registries
pub trait RenderedResource: Send + Sync {
    fn name(&self) -> &str;
    fn uri(&self) -> &str;
    fn render(&self) -> String;
    fn close(&self);
}

impl<V> RenderedResource for ReactiveProjection<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        ReactiveProjection::name(self)
    }

    fn uri(&self) -> &str {
        ReactiveProjection::uri(self)
    }

    fn render(&self) -> String {
        ReactiveProjection::render(self)
    }

    fn close(&self) {
        ReactiveProjection::close(self)
    }
}
