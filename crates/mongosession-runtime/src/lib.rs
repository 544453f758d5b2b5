//! MongoDB Session Runtime
//!
//! This crate wires the connection core into a usable session:
//! - `SessionContext`: process-wide owner of the single identity resolver
//! - `Session`: connection state machine, resources, event logger and idle timer
//! - Resources `debug://mongodb` and `history://connection`
//! - `MongoDriver` (feature `mongodb`): the `Driver` backed by the official client

pub mod config;
pub mod context;
pub mod errors;
pub mod logger;
pub mod resources;
pub mod session;

#[cfg(feature = "mongodb")]
pub mod mongo;

pub use config::{SessionConfig, DEFAULT_HISTORY_LIMIT};
pub use context::SessionContext;
pub use errors::{Result, SessionError};
pub use logger::spawn_event_logger;
pub use resources::{
    ChannelSink, DebugView, HistoryEntry, HistoryLog, ResourceDescriptor, ResourceRegistry,
    ResourceUpdated, DEBUG_RESOURCE_URI, HISTORY_RESOURCE_URI,
};
pub use session::Session;

#[cfg(feature = "mongodb")]
pub use mongo::{MongoDriver, MongoHandle};

// Re-export core types for convenience
pub use mongosession_core::{
    infer_auth_type, AtlasContext, AuthType, ConnectionConfig, ConnectionError,
    ConnectionSettings, ConnectionState, DiagnosticCommand, Guidance, IdentityConfig,
    RecoveryAction, RecoveryCategory, StateTag, UNKNOWN_DEVICE_ID,
};
