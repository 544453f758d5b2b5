//! Session configuration

use core::time::Duration;
use serde::{Deserialize, Serialize};

use mongosession_core::config::option_duration_ms;
use mongosession_core::{ConnectionConfig, IdentityConfig};

/// Default number of transitions kept by `history://connection`
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Configuration for a `Session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub identity: IdentityConfig,
    /// Disconnect after this long without activity. Disabled when `None`.
    #[serde(with = "option_duration_ms")]
    pub idle_timeout: Option<Duration>,
    /// Entries retained by the connection history resource
    pub history_limit: usize,
    /// Used by `Session::connect_default`
    pub default_connection_string: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            identity: IdentityConfig::default(),
            idle_timeout: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_connection_string: None,
        }
    }
}

impl SessionConfig {
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_default_connection_string<S: Into<String>>(mut self, connection_string: S) -> Self {
        self.default_connection_string = Some(connection_string.into());
        self
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            connection: ConnectionConfig::testing(),
            identity: IdentityConfig::default().with_timeout(Duration::from_millis(100)),
            idle_timeout: None,
            history_limit: 8,
            default_connection_string: None,
        }
    }
}
