//! MongoDB session
//!
//! A `Session` owns one connection state machine together with the
//! resources observing it, the event logger and the idle-disconnect timer.
//! Device identity comes from the process-wide `SessionContext`.

use std::sync::{Arc, Mutex};

use mongosession_core::{
    classify, ConnectionHandle, ConnectionManager, ConnectionSettings, ConnectionState, CoreError,
    DeferredTask, Driver, EventBroadcaster, Guidance, IdentityResolver, ProjectionSink,
    RecoveryAction, RenderedResource,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::errors::{Result, SessionError};
use crate::logger::spawn_event_logger;
use crate::resources::{debug_resource, history_resource, ResourceDescriptor, ResourceRegistry};

struct SessionInner {
    config: SessionConfig,
    manager: ConnectionManager,
    resources: ResourceRegistry,
    identity: IdentityResolver,
    idle: Mutex<Option<DeferredTask>>,
    shutdown: CancellationToken,
    logger: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self
            .idle
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            task.cancel();
        }
    }
}

/// A MongoDB session and its observers
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state().tag())
            .field("resources", &self.inner.resources.list())
            .finish()
    }
}

impl Session {
    /// Create a session. Must be called within a tokio runtime.
    ///
    /// Resources are registered before the state machine exists, so they
    /// observe every event the session ever emits.
    pub fn new(
        context: &SessionContext,
        driver: Arc<dyn Driver>,
        config: SessionConfig,
        sink: Arc<dyn ProjectionSink>,
    ) -> Result<Self> {
        let broadcaster = EventBroadcaster::new();
        let shutdown = CancellationToken::new();
        let logger = spawn_event_logger(&broadcaster, shutdown.clone());

        let resources = ResourceRegistry::new();
        resources.register(Arc::new(debug_resource(&broadcaster, Arc::clone(&sink))?))?;
        resources.register(Arc::new(history_resource(
            &broadcaster,
            sink,
            config.history_limit,
        )?))?;

        let manager = ConnectionManager::new(driver, broadcaster, config.connection.clone());

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                manager,
                resources,
                identity: context.identity_resolver(),
                idle: Mutex::new(None),
                shutdown,
                logger: Mutex::new(Some(logger)),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.inner.manager
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        self.inner.manager.broadcaster()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    /// Connect, replacing any existing connection
    pub async fn connect(&self, settings: &ConnectionSettings) -> Result<ConnectionState> {
        let state = self.inner.manager.connect(settings).await?;
        self.touch();
        Ok(state)
    }

    /// Connect with the configured default connection string
    pub async fn connect_default(&self) -> Result<ConnectionState> {
        let connection_string = self
            .inner
            .config
            .default_connection_string
            .clone()
            .ok_or_else(|| SessionError::config_error("no default connection string configured"))?;
        self.connect(&ConnectionSettings::new(connection_string)).await
    }

    pub async fn disconnect(&self) -> ConnectionState {
        self.cancel_idle_timer();
        self.inner.manager.disconnect().await
    }

    /// Handle of the live connection, counting as activity
    pub fn ensure_connected(&self) -> Result<ConnectionHandle> {
        let handle = self.inner.manager.ensure_connected()?;
        self.touch();
        Ok(handle)
    }

    /// Record activity, restarting the idle timer when one is configured
    pub fn touch(&self) {
        let Some(timeout) = self.inner.config.idle_timeout else {
            return;
        };

        let mut idle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match idle.as_ref() {
            Some(task) => task.restart(),
            None => {
                let manager = self.inner.manager.clone();
                *idle = Some(DeferredTask::schedule(
                    move || {
                        let manager = manager.clone();
                        async move {
                            if manager.state().holds_connection() {
                                info!("Disconnecting idle MongoDB session");
                                manager.disconnect().await;
                            }
                        }
                    },
                    timeout,
                ));
            }
        }
    }

    /// Explain a failure with the current connection state as context
    pub fn explain(&self, error: &SessionError, actions: &[RecoveryAction]) -> Guidance {
        match error {
            SessionError::Connection(error) => {
                classify(&CoreError::from(error.clone()), actions, &self.state())
            }
            SessionError::Core(error) => classify(error, actions, &self.state()),
            _ => Guidance::Unhandled,
        }
    }

    pub fn resource(&self, uri: &str) -> Option<Arc<dyn RenderedResource>> {
        self.inner.resources.get(uri)
    }

    pub fn render(&self, uri: &str) -> Result<String> {
        self.inner.resources.render(uri)
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.inner.resources.list()
    }

    /// Stable device identity, or the fallback sentinel
    pub async fn device_id(&self) -> String {
        self.inner.identity.resolve().await
    }

    /// Disconnect and stop every background task owned by the session
    pub async fn close(&self) {
        self.cancel_idle_timer();
        self.inner.manager.disconnect().await;
        self.inner.resources.close_all();
        self.inner.shutdown.cancel();

        let logger = self
            .inner
            .logger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(logger) = logger {
            if let Err(err) = logger.await {
                debug!(error = %err, "Event logger ended abnormally");
            }
        }
    }

    fn cancel_idle_timer(&self) {
        if let Some(task) = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            task.cancel();
        }
    }
}
