//! Connection lifecycle
//!
//! The state machine owning the single authoritative connection, its state
//! types and the pure connection-string helpers it relies on.

pub mod auth;
pub mod manager;
pub mod state;

pub use auth::{infer_auth_type, normalize_connection_string};
pub use manager::{ConnectionManager, ConnectionSettings};
pub use state::{
    AuthType, ConnectedState, ConnectingState, ConnectionState, ErroredState, OidcFlow, StateTag,
};
