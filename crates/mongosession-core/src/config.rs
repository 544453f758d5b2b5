//! Configuration for the session core components
//!
//! Durations are serialized as integer milliseconds.

use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Default timeout for device identity resolution
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default timeout for the post-connect handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ----------------------------------------------------------------------------
// Connection Configuration
// ----------------------------------------------------------------------------

/// Configuration for the connection state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Client-identifying `appName` injected into connection strings lacking one
    pub app_name: String,
    /// Upper bound for the post-connect health check
    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,
    /// Whether an interactive browser is available for OIDC flows
    pub oidc_browser_flow: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            app_name: format!("mongosession {}", env!("CARGO_PKG_VERSION")),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            oidc_browser_flow: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the injected application name
    pub fn with_app_name<T: Into<String>>(mut self, app_name: T) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Enable or disable the browser-based OIDC flow
    pub fn with_oidc_browser_flow(mut self, enabled: bool) -> Self {
        self.oidc_browser_flow = enabled;
        self
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            app_name: "mongosession-test".to_string(),
            handshake_timeout: Duration::from_millis(500),
            oidc_browser_flow: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Identity Configuration
// ----------------------------------------------------------------------------

/// Configuration for the device identity resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Upper bound for a single resolution
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_IDENTITY_TIMEOUT,
        }
    }
}

impl IdentityConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ----------------------------------------------------------------------------
// Serde Helpers
// ----------------------------------------------------------------------------

/// Serialize a `Duration` as integer milliseconds
pub mod duration_ms {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serialize an `Option<Duration>` as optional integer milliseconds
pub mod option_duration_ms {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
    }
}
