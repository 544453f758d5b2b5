//! Connection State Types
//!
//! A tagged union with exactly one authoritative instance at any time. States
//! are immutable values: every transition replaces the whole state, so a
//! clone captured before a transition never observes later changes.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::driver::{ConnectionHandle, DeviceFlowPrompt};
use crate::types::AtlasContext;

// ----------------------------------------------------------------------------
// Authentication Types
// ----------------------------------------------------------------------------

/// Authentication mechanism implied by a connection string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "scram")]
    Scram,
    #[serde(rename = "ldap")]
    Ldap,
    #[serde(rename = "kerberos")]
    Kerberos,
    #[serde(rename = "oidc-auth-flow")]
    OidcAuthFlow,
    #[serde(rename = "oidc-device-flow")]
    OidcDeviceFlow,
    #[serde(rename = "x.509")]
    X509,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Scram => "scram",
            AuthType::Ldap => "ldap",
            AuthType::Kerberos => "kerberos",
            AuthType::OidcAuthFlow => "oidc-auth-flow",
            AuthType::OidcDeviceFlow => "oidc-device-flow",
            AuthType::X509 => "x.509",
        }
    }

    /// Whether the mechanism requires an interactive OIDC handshake
    pub fn is_oidc(&self) -> bool {
        matches!(self, AuthType::OidcAuthFlow | AuthType::OidcDeviceFlow)
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// OIDC Flow
// ----------------------------------------------------------------------------

/// Interactive authentication flow outstanding while connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcFlow {
    pub kind: AuthType,
    pub login_url: Option<String>,
    pub user_code: Option<String>,
}

impl OidcFlow {
    /// Flow awaiting completion without a user prompt yet
    pub fn pending(kind: AuthType) -> Self {
        Self {
            kind,
            login_url: None,
            user_code: None,
        }
    }

    /// Device flow prompting the user with a URL and one-time code
    pub fn device(prompt: DeviceFlowPrompt) -> Self {
        Self {
            kind: AuthType::OidcDeviceFlow,
            login_url: Some(prompt.verification_url),
            user_code: Some(prompt.user_code),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Authoritative connection state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectionState {
    /// No handle
    #[default]
    Disconnected,
    /// Handshake pending, or an interactive auth flow outstanding
    Connecting(ConnectingState),
    /// Handshake verified
    Connected(ConnectedState),
    /// Last attempt failed; handle discarded
    Errored(ErroredState),
}

/// Handle obtained (or being obtained) but not yet verified.
///
/// `handle` is `None` only while a device-flow prompt arrives before the
/// driver has returned the handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectingState {
    pub handle: Option<ConnectionHandle>,
    pub auth_type: AuthType,
    pub oidc_flow: Option<OidcFlow>,
    pub atlas: Option<AtlasContext>,
}

/// Verified live connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedState {
    pub handle: ConnectionHandle,
    pub auth_type: AuthType,
    pub atlas: Option<AtlasContext>,
}

/// Failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErroredState {
    pub reason: String,
    pub auth_type: Option<AuthType>,
    pub atlas: Option<AtlasContext>,
}

/// Tag of a `ConnectionState`, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateTag {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTag::Disconnected => write!(f, "disconnected"),
            StateTag::Connecting => write!(f, "connecting"),
            StateTag::Connected => write!(f, "connected"),
            StateTag::Errored => write!(f, "errored"),
        }
    }
}

impl ConnectionState {
    /// Get current state tag for logging and projections
    pub fn tag(&self) -> StateTag {
        match self {
            ConnectionState::Disconnected => StateTag::Disconnected,
            ConnectionState::Connecting(_) => StateTag::Connecting,
            ConnectionState::Connected(_) => StateTag::Connected,
            ConnectionState::Errored(_) => StateTag::Errored,
        }
    }

    /// Live handle, if the state holds one
    pub fn handle(&self) -> Option<&ConnectionHandle> {
        match self {
            ConnectionState::Connecting(state) => state.handle.as_ref(),
            ConnectionState::Connected(state) => Some(&state.handle),
            _ => None,
        }
    }

    /// Authentication type, when known
    pub fn auth_type(&self) -> Option<AuthType> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting(state) => Some(state.auth_type),
            ConnectionState::Connected(state) => Some(state.auth_type),
            ConnectionState::Errored(state) => state.auth_type,
        }
    }

    /// Atlas context carried by the state
    pub fn atlas(&self) -> Option<&AtlasContext> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting(state) => state.atlas.as_ref(),
            ConnectionState::Connected(state) => state.atlas.as_ref(),
            ConnectionState::Errored(state) => state.atlas.as_ref(),
        }
    }

    /// Outstanding OIDC flow, if connecting through one
    pub fn oidc_flow(&self) -> Option<&OidcFlow> {
        match self {
            ConnectionState::Connecting(state) => state.oidc_flow.as_ref(),
            _ => None,
        }
    }

    /// Whether the state owns a handle that must be closed before reuse
    pub fn holds_connection(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting(_) | ConnectionState::Connected(_)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ConnectionState::default();
        assert_eq!(state.tag(), StateTag::Disconnected);
        assert!(state.handle().is_none());
        assert!(!state.holds_connection());
        assert!(!state.is_connected());
    }

    #[test]
    fn test_errored_state_accessors() {
        let state = ConnectionState::Errored(ErroredState {
            reason: "boom".to_string(),
            auth_type: Some(AuthType::Ldap),
            atlas: Some(AtlasContext::new("p", "c")),
        });

        assert_eq!(state.tag(), StateTag::Errored);
        assert_eq!(state.auth_type(), Some(AuthType::Ldap));
        assert_eq!(state.atlas().map(|a| a.cluster_name.as_str()), Some("c"));
        assert!(!state.holds_connection());
    }

    #[test]
    fn test_connecting_without_handle_exposes_oidc_flow() {
        let state = ConnectionState::Connecting(ConnectingState {
            handle: None,
            auth_type: AuthType::OidcDeviceFlow,
            oidc_flow: Some(OidcFlow::device(DeviceFlowPrompt {
                verification_url: "https://x/y".to_string(),
                user_code: "ABC-123".to_string(),
            })),
            atlas: None,
        });

        let flow = state.oidc_flow().cloned();
        assert_eq!(
            flow.and_then(|f| f.login_url),
            Some("https://x/y".to_string())
        );
        assert!(state.holds_connection());
        assert!(state.handle().is_none());
    }

    #[test]
    fn test_auth_type_strings() {
        assert_eq!(AuthType::X509.as_str(), "x.509");
        assert_eq!(AuthType::OidcAuthFlow.to_string(), "oidc-auth-flow");
        assert!(AuthType::OidcDeviceFlow.is_oidc());
        assert!(!AuthType::Kerberos.is_oidc());
    }
}
