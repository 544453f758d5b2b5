//! Cancellable, restartable single-shot timer
//!
//! At most one fire is pending at a time. `restart` replaces the pending
//! timer atomically; a timer that was cancelled or replaced never runs its
//! callback, even if its sleep had already elapsed.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Callback = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

struct TimerSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct DeferredInner {
    delay: Duration,
    callback: Callback,
    slot: Mutex<TimerSlot>,
}

/// Handle to a scheduled callback
#[derive(Clone)]
pub struct DeferredTask {
    inner: Arc<DeferredInner>,
}

impl std::fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTask")
            .field("delay", &self.inner.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl DeferredTask {
    /// Schedule `callback` to run once after `delay`.
    ///
    /// Must be called within a tokio runtime. The returned future is spawned
    /// when the timer fires and is not awaited by the timer.
    pub fn schedule<F, Fut>(callback: F, delay: Duration) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback = Arc::new(move || Box::pin(callback()) as BoxFuture);
        let task = Self {
            inner: Arc::new(DeferredInner {
                delay,
                callback,
                slot: Mutex::new(TimerSlot {
                    generation: 0,
                    pending: None,
                }),
            }),
        };
        task.restart();
        task
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Prevent a pending fire. Safe to call repeatedly or after firing.
    pub fn cancel(&self) {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        if let Some(pending) = slot.pending.take() {
            pending.abort();
            trace!("Deferred task cancelled");
        }
    }

    /// Replace any pending fire with a new one after the full delay
    pub fn restart(&self) {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        if let Some(pending) = slot.pending.take() {
            pending.abort();
        }

        let generation = slot.generation;
        let inner = Arc::clone(&self.inner);
        slot.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            {
                let mut slot = inner
                    .slot
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if slot.generation != generation {
                    return;
                }
                slot.pending = None;
            }
            trace!("Deferred task fired");
            tokio::spawn((inner.callback)());
        }));
    }

    /// Whether a fire is still pending
    pub fn is_pending(&self) -> bool {
        self.lock_slot().pending.is_some()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, TimerSlot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
