//! Error types for the session runtime

use mongosession_core::{ConnectionError, CoreError};
use thiserror::Error;

/// Errors surfaced by the session layer
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// A second identity resolver was requested while one is active
    #[error("An identity resolver is already active in this process")]
    IdentityResolverActive,

    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl SessionError {
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SessionError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn resource_not_found<T: Into<String>>(uri: T) -> Self {
        SessionError::ResourceNotFound { uri: uri.into() }
    }

    /// The connection failure behind this error, if any
    pub fn connection_error(&self) -> Option<&ConnectionError> {
        match self {
            SessionError::Connection(error) => Some(error),
            SessionError::Core(CoreError::Connection(error)) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = core::result::Result<T, SessionError>;
