//! MongoDB Session Core
//!
//! This crate manages the lifecycle of a single logical connection to a
//! MongoDB deployment and propagates every lifecycle transition to
//! independent observers. It provides the connection state machine, the
//! typed event broadcaster, reactive projections over the event stream, the
//! error classifier that turns failures into actionable guidance, and the
//! deferred-task and identity-resolution utilities used by the session layer.
//!
//! The MongoDB client itself sits behind the `Driver` trait; this crate does
//! no network I/O of its own.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod classifier;
pub mod config;
pub mod connection;
pub mod deferred;
pub mod driver;
pub mod errors;
pub mod events;
pub mod identity;
pub mod projection;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use classifier::{classify, explain, Explanation, Guidance, RecoveryAction, RecoveryCategory};
pub use config::{ConnectionConfig, IdentityConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_IDENTITY_TIMEOUT};
pub use connection::manager::ConnectionStats;
pub use connection::{
    infer_auth_type, normalize_connection_string, AuthType, ConnectedState, ConnectingState,
    ConnectionManager, ConnectionSettings, ConnectionState, ErroredState, OidcFlow, StateTag,
};
pub use deferred::DeferredTask;
pub use driver::{
    ConnectionHandle, DeviceFlowNotifier, DeviceFlowPrompt, DiagnosticCommand, Driver,
    DriverHandle, DriverOptions, OidcFlowKind, OidcOptions,
};
pub use errors::{
    ConnectionError, CoreError, DriverError, ErrorCode, IdentityError, Result, SinkError,
};
pub use events::{ConnectionEvent, ConnectionEventHandler, EventBroadcaster, EventKind, ListenerId};
pub use identity::{IdentityResolver, IdentitySource, MachineIdSource, UNKNOWN_DEVICE_ID};
pub use projection::{ProjectionBuilder, ProjectionSink, ReactiveProjection, RenderedResource};
pub use types::{AtlasContext, Timestamp};
