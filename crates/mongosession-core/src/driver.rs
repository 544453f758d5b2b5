//! Driver abstraction for the remote data service
//!
//! The MongoDB client library is an external collaborator. This module
//! specifies only the interface the connection state machine needs from it:
//! obtaining a handle, running a diagnostic command against it and closing it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::DriverError;

// ----------------------------------------------------------------------------
// Driver Traits
// ----------------------------------------------------------------------------

/// Factory for live connections to the remote data service
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a connection. Fails when the endpoint cannot be reached or the
    /// connection string is rejected.
    async fn connect(
        &self,
        connection_string: &str,
        options: &DriverOptions,
    ) -> Result<Arc<dyn DriverHandle>, DriverError>;
}

/// A live connection obtained from a `Driver`
#[async_trait]
pub trait DriverHandle: Send + Sync + fmt::Debug {
    /// Run a lightweight diagnostic command against the connection
    async fn run_diagnostic_command(&self, command: DiagnosticCommand) -> Result<(), DriverError>;

    /// Close the connection
    async fn close(&self, force: bool) -> Result<(), DriverError>;

    /// Access the concrete handle for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Diagnostic commands understood by every driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCommand {
    /// `{ hello: 1 }` against the `admin` database
    Hello,
    /// `{ ping: 1 }` against the `admin` database
    Ping,
}

// ----------------------------------------------------------------------------
// Driver Options
// ----------------------------------------------------------------------------

/// Options passed to `Driver::connect`
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Application name reported to the server
    pub app_name: String,
    /// OIDC options, present only for OIDC connection strings
    pub oidc: Option<OidcOptions>,
}

/// OIDC flows a driver may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidcFlowKind {
    /// Authorization-code flow through a local browser
    AuthCode,
    /// Device-authorization flow, prompting the user with a URL and code
    DeviceAuth,
}

/// Prompt reported by a driver when the device flow needs user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFlowPrompt {
    pub verification_url: String,
    pub user_code: String,
}

/// Callback invoked by a driver while `connect` is pending
pub type DeviceFlowNotifier = Arc<dyn Fn(DeviceFlowPrompt) + Send + Sync>;

/// OIDC configuration handed to the driver
#[derive(Clone)]
pub struct OidcOptions {
    pub allowed_flows: Vec<OidcFlowKind>,
    pub device_flow_notifier: Option<DeviceFlowNotifier>,
}

impl fmt::Debug for OidcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcOptions")
            .field("allowed_flows", &self.allowed_flows)
            .field("device_flow_notifier", &self.device_flow_notifier.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Shared reference to the live driver handle owned by the state machine.
///
/// Consumers may run diagnostics or downcast to the concrete driver type,
/// but only the state machine can close the connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<dyn DriverHandle>,
}

impl ConnectionHandle {
    pub(crate) fn new(inner: Arc<dyn DriverHandle>) -> Self {
        Self { inner }
    }

    /// Run a diagnostic command against the live connection
    pub async fn run_diagnostic_command(&self, command: DiagnosticCommand) -> Result<(), DriverError> {
        self.inner.run_diagnostic_command(command).await
    }

    /// Downcast to the concrete driver handle
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Whether both handles refer to the same live connection
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) async fn close(&self, force: bool) -> Result<(), DriverError> {
        self.inner.close(force).await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.inner).finish()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_connection(other)
    }
}
