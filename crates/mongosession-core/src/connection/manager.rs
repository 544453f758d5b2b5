//! Connection state machine
//!
//! The `ConnectionManager` owns the single authoritative `ConnectionState`,
//! executes connect/disconnect against a `Driver` and broadcasts every
//! transition. Each transition replaces the state and emits its event under
//! one lock, so observers see transitions in the order they were applied.
//! Every connect and disconnect bumps an attempt counter. Work finishing for
//! an older attempt never transitions, and a handle it opened is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::auth::{infer_auth_type, normalize_connection_string};
use super::state::{
    AuthType, ConnectedState, ConnectingState, ConnectionState, ErroredState, OidcFlow,
};
use crate::config::ConnectionConfig;
use crate::driver::{
    ConnectionHandle, DeviceFlowNotifier, DeviceFlowPrompt, DiagnosticCommand, Driver,
    DriverOptions, OidcFlowKind, OidcOptions,
};
use crate::errors::ConnectionError;
use crate::events::{ConnectionEvent, EventBroadcaster};
use crate::types::AtlasContext;

// ----------------------------------------------------------------------------
// Connection Settings
// ----------------------------------------------------------------------------

/// Caller-supplied settings for a connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub connection_string: String,
    pub atlas: Option<AtlasContext>,
}

impl ConnectionSettings {
    pub fn new<S: Into<String>>(connection_string: S) -> Self {
        Self {
            connection_string: connection_string.into(),
            atlas: None,
        }
    }

    pub fn with_atlas(mut self, atlas: AtlasContext) -> Self {
        self.atlas = Some(atlas);
        self
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Connection lifecycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connect_attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub disconnects: u64,
}

// ----------------------------------------------------------------------------
// Handshake Outcome
// ----------------------------------------------------------------------------

enum HandshakeFailure {
    TimedOut(String),
    Failed(String),
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

struct ManagerInner {
    driver: Arc<dyn Driver>,
    config: ConnectionConfig,
    broadcaster: EventBroadcaster,
    state: watch::Sender<ConnectionState>,
    /// Serializes state replacement with its broadcast
    transition_lock: Mutex<()>,
    /// Bumped by every connect and disconnect; background work for an older
    /// attempt must not overwrite newer state
    attempt: AtomicU64,
    stats: Mutex<ConnectionStats>,
}

/// Owner of the single authoritative connection
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state().tag())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state
    pub fn new(
        driver: Arc<dyn Driver>,
        broadcaster: EventBroadcaster,
        config: ConnectionConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ManagerInner {
                driver,
                config,
                broadcaster,
                state,
                transition_lock: Mutex::new(()),
                attempt: AtomicU64::new(0),
                stats: Mutex::new(ConnectionStats::default()),
            }),
        }
    }

    /// Snapshot of the authoritative state. Never blocks on I/O.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state replacement
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.inner.broadcaster
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn statistics(&self) -> ConnectionStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Handle of the verified connection, or `NotConnected`
    pub fn ensure_connected(&self) -> Result<ConnectionHandle, ConnectionError> {
        match self.state() {
            ConnectionState::Connected(state) => Ok(state.handle),
            ConnectionState::Connecting(_) => Err(ConnectionError::NotConnected(
                "connection attempt still in progress".to_string(),
            )),
            ConnectionState::Errored(state) => Err(ConnectionError::NotConnected(state.reason)),
            ConnectionState::Disconnected => Err(ConnectionError::NotConnected(
                "no connection has been established".to_string(),
            )),
        }
    }

    /// Connect with the given settings, replacing any existing connection
    pub async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<ConnectionState, ConnectionError> {
        self.inner.announce_request();
        self.inner.update_stats(|stats| stats.connect_attempts += 1);

        if self.state().holds_connection() {
            self.disconnect().await;
        }

        let attempt = self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let atlas = settings.atlas.clone();

        let normalized =
            match normalize_connection_string(&settings.connection_string, &self.inner.config.app_name) {
                Ok(normalized) => normalized,
                Err(err) => {
                    return Err(self.inner.fail_connect(attempt, err.message().to_string(), None, atlas))
                }
            };

        let auth_type = infer_auth_type(&settings.connection_string);
        let options = self.driver_options(auth_type, attempt, atlas.clone());

        let handle = match self.inner.driver.connect(&normalized, &options).await {
            Ok(handle) => ConnectionHandle::new(handle),
            Err(err) => {
                return Err(self.inner.fail_connect(
                    attempt,
                    err.message().to_string(),
                    Some(auth_type),
                    atlas,
                ))
            }
        };

        if auth_type.is_oidc() {
            return self.begin_oidc_handshake(attempt, handle, auth_type, atlas).await;
        }

        match self.inner.handshake(&handle).await {
            Ok(()) => match self.inner.succeed(attempt, handle.clone(), auth_type, atlas) {
                Some(state) => Ok(state),
                None => {
                    close_quietly(&handle).await;
                    Err(superseded())
                }
            },
            Err(failure) => {
                close_quietly(&handle).await;
                Err(self.inner.fail_handshake(attempt, failure, auth_type, atlas))
            }
        }
    }

    /// Close the current connection. A no-op when nothing is held.
    pub async fn disconnect(&self) -> ConnectionState {
        let current = self.state();
        if !current.holds_connection() {
            return current;
        }

        let attempt = self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(handle) = current.handle() {
            close_quietly(handle).await;
        }

        // A connect that started while the handle was closing owns the state now
        if !self
            .inner
            .transition_if_current(attempt, ConnectionState::Disconnected, ConnectionEvent::Closed)
        {
            return self.state();
        }
        self.inner.update_stats(|stats| stats.disconnects += 1);
        ConnectionState::Disconnected
    }

    fn driver_options(
        &self,
        auth_type: AuthType,
        attempt: u64,
        atlas: Option<AtlasContext>,
    ) -> DriverOptions {
        let oidc = auth_type.is_oidc().then(|| {
            let allowed_flows = if self.inner.config.oidc_browser_flow {
                vec![OidcFlowKind::AuthCode, OidcFlowKind::DeviceAuth]
            } else {
                vec![OidcFlowKind::DeviceAuth]
            };

            let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
            let notifier: DeviceFlowNotifier = Arc::new(move |prompt: DeviceFlowPrompt| {
                if let Some(inner) = weak.upgrade() {
                    inner.device_flow_prompted(attempt, auth_type, prompt, atlas.clone());
                }
            });

            OidcOptions {
                allowed_flows,
                device_flow_notifier: Some(notifier),
            }
        });

        DriverOptions {
            app_name: self.inner.config.app_name.clone(),
            oidc,
        }
    }

    /// Publish `Connecting` and finish the handshake in the background
    async fn begin_oidc_handshake(
        &self,
        attempt: u64,
        handle: ConnectionHandle,
        auth_type: AuthType,
        atlas: Option<AtlasContext>,
    ) -> Result<ConnectionState, ConnectionError> {
        // Keep a device-flow prompt that arrived while the driver was connecting
        let oidc_flow = self
            .state()
            .oidc_flow()
            .cloned()
            .unwrap_or_else(|| OidcFlow::pending(auth_type));

        let connecting = ConnectionState::Connecting(ConnectingState {
            handle: Some(handle.clone()),
            auth_type,
            oidc_flow: Some(oidc_flow),
            atlas: atlas.clone(),
        });

        let applied = self.inner.transition_if_current(
            attempt,
            connecting.clone(),
            ConnectionEvent::Requested(connecting.clone()),
        );
        if !applied {
            close_quietly(&handle).await;
            return Err(superseded());
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.handshake(&handle).await;
            if inner.attempt.load(Ordering::SeqCst) != attempt {
                debug!(attempt, "Discarding handshake result for superseded attempt");
                return;
            }

            match outcome {
                Ok(()) => {
                    let connected = ConnectedState {
                        handle,
                        auth_type,
                        atlas,
                    };
                    if inner.transition_if_current(
                        attempt,
                        ConnectionState::Connected(connected.clone()),
                        ConnectionEvent::Succeeded(connected),
                    ) {
                        inner.update_stats(|stats| stats.successes += 1);
                    }
                }
                Err(failure) => {
                    close_quietly(&handle).await;
                    let (errored, event) = inner.errored_for(failure, auth_type, atlas);
                    inner.transition_if_current(attempt, ConnectionState::Errored(errored), event);
                }
            }
        });

        Ok(connecting)
    }
}

impl ManagerInner {
    fn update_stats<F: FnOnce(&mut ConnectionStats)>(&self, update: F) {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut stats);
    }

    /// Broadcast `Requested` with the still-authoritative current state
    fn announce_request(&self) {
        let _guard = self
            .transition_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.state.borrow().clone();
        self.broadcaster.emit(ConnectionEvent::Requested(current));
    }

    /// Replace the state and broadcast its event atomically, but only while
    /// `attempt` is still the latest
    fn transition_if_current(
        &self,
        attempt: u64,
        next: ConnectionState,
        event: ConnectionEvent,
    ) -> bool {
        let _guard = self
            .transition_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.attempt.load(Ordering::SeqCst) != attempt {
            return false;
        }
        self.apply(next, event);
        true
    }

    fn apply(&self, next: ConnectionState, event: ConnectionEvent) {
        let to = next.tag();
        let previous = self.state.send_replace(next);
        debug!(
            from = %previous.tag(),
            to = %to,
            event = %event.kind(),
            "Connection state transition"
        );
        self.broadcaster.emit(event);
    }

    fn device_flow_prompted(
        &self,
        attempt: u64,
        auth_type: AuthType,
        prompt: DeviceFlowPrompt,
        atlas: Option<AtlasContext>,
    ) {
        debug!(url = %prompt.verification_url, "OIDC device flow awaiting user");
        let handle = self.state.borrow().handle().cloned();
        let connecting = ConnectionState::Connecting(ConnectingState {
            handle,
            auth_type,
            oidc_flow: Some(OidcFlow::device(prompt)),
            atlas,
        });
        self.transition_if_current(
            attempt,
            connecting.clone(),
            ConnectionEvent::Requested(connecting),
        );
    }

    async fn handshake(&self, handle: &ConnectionHandle) -> Result<(), HandshakeFailure> {
        let timeout = self.config.handshake_timeout;
        match tokio::time::timeout(timeout, handle.run_diagnostic_command(DiagnosticCommand::Hello))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(HandshakeFailure::Failed(err.message().to_string())),
            Err(_) => Err(HandshakeFailure::TimedOut(format!(
                "handshake did not complete within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Install the verified connection. `None` when a newer attempt owns the
    /// state; the caller still holds the handle and must close it.
    fn succeed(
        &self,
        attempt: u64,
        handle: ConnectionHandle,
        auth_type: AuthType,
        atlas: Option<AtlasContext>,
    ) -> Option<ConnectionState> {
        let connected = ConnectedState {
            handle,
            auth_type,
            atlas,
        };
        let state = ConnectionState::Connected(connected.clone());
        if !self.transition_if_current(attempt, state.clone(), ConnectionEvent::Succeeded(connected)) {
            debug!(attempt, "Discarding connection for superseded attempt");
            return None;
        }
        self.update_stats(|stats| stats.successes += 1);
        Some(state)
    }

    fn fail_connect(
        &self,
        attempt: u64,
        reason: String,
        auth_type: Option<AuthType>,
        atlas: Option<AtlasContext>,
    ) -> ConnectionError {
        warn!(reason = %reason, "Failed to connect to MongoDB");
        let errored = ErroredState {
            reason: reason.clone(),
            auth_type,
            atlas,
        };
        self.update_stats(|stats| stats.failures += 1);
        self.transition_if_current(
            attempt,
            ConnectionState::Errored(errored.clone()),
            ConnectionEvent::Errored(errored),
        );
        ConnectionError::MisconfiguredEndpoint(reason)
    }

    fn errored_for(
        &self,
        failure: HandshakeFailure,
        auth_type: AuthType,
        atlas: Option<AtlasContext>,
    ) -> (ErroredState, ConnectionEvent) {
        match failure {
            HandshakeFailure::TimedOut(reason) => {
                warn!(reason = %reason, "MongoDB handshake timed out");
                self.update_stats(|stats| stats.timeouts += 1);
                let errored = ErroredState {
                    reason,
                    auth_type: Some(auth_type),
                    atlas,
                };
                (errored.clone(), ConnectionEvent::TimedOut(errored))
            }
            HandshakeFailure::Failed(reason) => {
                warn!(reason = %reason, "MongoDB handshake failed");
                self.update_stats(|stats| stats.failures += 1);
                let errored = ErroredState {
                    reason,
                    auth_type: Some(auth_type),
                    atlas,
                };
                (errored.clone(), ConnectionEvent::Errored(errored))
            }
        }
    }

    fn fail_handshake(
        &self,
        attempt: u64,
        failure: HandshakeFailure,
        auth_type: AuthType,
        atlas: Option<AtlasContext>,
    ) -> ConnectionError {
        let (errored, event) = self.errored_for(failure, auth_type, atlas);
        let reason = errored.reason.clone();
        self.transition_if_current(attempt, ConnectionState::Errored(errored), event);
        ConnectionError::NotConnected(reason)
    }
}

fn superseded() -> ConnectionError {
    ConnectionError::NotConnected("connection attempt was superseded".to_string())
}

/// Best-effort close; failures are logged and swallowed
async fn close_quietly(handle: &ConnectionHandle) {
    if let Err(err) = handle.close(true).await {
        debug!(error = %err, "Ignoring error while closing MongoDB connection");
    }
}
