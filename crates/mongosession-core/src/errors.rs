//! Error types for the MongoDB session core
//!
//! This module contains the connection error kinds surfaced to callers of the
//! state machine, the driver boundary error, the projection sink error and the
//! `CoreError` type that unifies them.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Codes
// ----------------------------------------------------------------------------

/// Machine-readable classification of a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Connect failed before any handle health was confirmed
    MisconfiguredEndpoint,
    /// Handshake failed, or no connection is currently established
    NotConnected,
}

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by `ConnectionManager::connect` and by consumers that
/// need a live connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Misconfigured connection string: {0}")]
    MisconfiguredEndpoint(String),

    #[error("Not connected to MongoDB: {0}")]
    NotConnected(String),
}

impl ConnectionError {
    /// Get the error code used by the error classifier
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectionError::MisconfiguredEndpoint(_) => ErrorCode::MisconfiguredEndpoint,
            ConnectionError::NotConnected(_) => ErrorCode::NotConnected,
        }
    }

    /// Raw underlying message, without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            ConnectionError::MisconfiguredEndpoint(message) => message,
            ConnectionError::NotConnected(message) => message,
        }
    }
}

/// Errors raised by a driver implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    Command(String),

    #[error("{0}")]
    Close(String),
}

impl DriverError {
    /// Raw driver message
    pub fn message(&self) -> &str {
        match self {
            DriverError::Connect(message) => message,
            DriverError::Command(message) => message,
            DriverError::Close(message) => message,
        }
    }
}

/// Errors raised by a projection sink when announcing a change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Notification failed: {0}")]
    Failed(String),
}

/// Errors raised while resolving the device identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Machine identity unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Core Error
// ----------------------------------------------------------------------------

/// Unified error type for the session core
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl CoreError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        CoreError::Configuration {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, CoreError>;
