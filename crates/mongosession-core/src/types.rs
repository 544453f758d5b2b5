//! Shared value types

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Atlas Context
// ----------------------------------------------------------------------------

/// Metadata identifying the managed-cloud cluster a connection targets.
///
/// Supplied by the caller of `connect` and carried into `Connected` and
/// `Errored` so later observers can explain what was being connected to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasContext {
    pub project_id: String,
    pub cluster_name: String,
    pub username: String,
    pub expires_at: Option<Timestamp>,
}

impl AtlasContext {
    pub fn new<P: Into<String>, C: Into<String>>(project_id: P, cluster_name: C) -> Self {
        Self {
            project_id: project_id.into(),
            cluster_name: cluster_name.into(),
            ..Default::default()
        }
    }

    pub fn with_username<U: Into<String>>(mut self, username: U) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the temporary credentials have expired at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map(|expiry| expiry <= now).unwrap_or(false)
    }
}
