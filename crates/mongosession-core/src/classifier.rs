//! Error classification
//!
//! Turns a connection failure into guidance a user can act on. The
//! classifier is a pure function of the error, the recovery actions
//! currently offered and the connection state.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::errors::{ConnectionError, CoreError, ErrorCode};

// ----------------------------------------------------------------------------
// Recovery Actions
// ----------------------------------------------------------------------------

/// Kind of connect action offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryCategory {
    /// Connects to a managed cloud cluster; preferred when available
    CloudManaged,
    /// Connects with a raw connection string
    Generic,
}

/// A registered action that can establish a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub name: String,
    pub category: RecoveryCategory,
}

impl RecoveryAction {
    pub fn cloud_managed<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            category: RecoveryCategory::CloudManaged,
        }
    }

    pub fn generic<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            category: RecoveryCategory::Generic,
        }
    }
}

// ----------------------------------------------------------------------------
// Guidance
// ----------------------------------------------------------------------------

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guidance {
    /// No guidance; the caller surfaces the raw error
    Unhandled,
    Explained(Explanation),
}

/// Structured, user-actionable explanation of a connection failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    pub code: ErrorCode,
    /// What went wrong
    pub summary: String,
    /// What to do next
    pub next_step: String,
    /// Action the user should invoke, when one is preferred
    pub preferred_action: Option<String>,
    /// Pending OIDC login URL and user code
    pub oidc_prompt: Option<(String, String)>,
    pub warnings: Vec<String>,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.summary, self.next_step)?;
        for warning in &self.warnings {
            write!(f, "\n{}", warning)?;
        }
        Ok(())
    }
}

impl Guidance {
    /// Rendered text, or `None` when unhandled
    pub fn text(&self) -> Option<String> {
        match self {
            Guidance::Unhandled => None,
            Guidance::Explained(explanation) => Some(explanation.to_string()),
        }
    }
}

// ----------------------------------------------------------------------------
// Classification
// ----------------------------------------------------------------------------

/// Classify any core error; only connection errors produce guidance
pub fn classify(error: &CoreError, actions: &[RecoveryAction], state: &ConnectionState) -> Guidance {
    match error {
        CoreError::Connection(error) => Guidance::Explained(explain(error, actions, state)),
        _ => Guidance::Unhandled,
    }
}

/// Explain a connection error
pub fn explain(
    error: &ConnectionError,
    actions: &[RecoveryAction],
    state: &ConnectionState,
) -> Explanation {
    let code = error.code();
    let summary = match code {
        ErrorCode::NotConnected => {
            "You need to connect to a MongoDB instance before you can access its data.".to_string()
        }
        ErrorCode::MisconfiguredEndpoint => format!(
            "The configured connection string is not valid. Please check the connection string and confirm it points to a valid MongoDB instance. Error: {}",
            error.message()
        ),
    };

    let mut warnings = Vec::new();
    if code == ErrorCode::MisconfiguredEndpoint {
        warnings.push(
            "Pipeline stages with side effects (such as $out or $merge) cannot run until a connection is re-established."
                .to_string(),
        );
    }

    let oidc_prompt = state.oidc_flow().and_then(|flow| {
        match (&flow.login_url, &flow.user_code) {
            (Some(url), Some(code)) => Some((url.clone(), code.clone())),
            _ => None,
        }
    });

    if let Some((url, user_code)) = &oidc_prompt {
        return Explanation {
            code,
            summary: "The connection is waiting for OIDC authentication to complete.".to_string(),
            next_step: format!(
                "Open {} in a browser and enter the code {} to finish signing in, then retry.",
                url, user_code
            ),
            preferred_action: None,
            oidc_prompt,
            warnings,
        };
    }

    let cloud_action = actions
        .iter()
        .find(|action| action.category == RecoveryCategory::CloudManaged);
    let generic_actions: Vec<&str> = actions
        .iter()
        .filter(|action| action.category == RecoveryCategory::Generic)
        .map(|action| action.name.as_str())
        .collect();

    let (next_step, preferred_action) = if let Some(action) = cloud_action {
        (
            format!(
                "Use the \"{}\" tool to connect to a MongoDB Atlas cluster.",
                action.name
            ),
            Some(action.name.clone()),
        )
    } else if !generic_actions.is_empty() {
        (
            format!(
                "Please use one of the following tools: {} to connect to a MongoDB instance or update the configuration to include a connection string.",
                generic_actions
                    .iter()
                    .map(|name| format!("\"{}\"", name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None,
        )
    } else {
        (
            "There are no tools available to connect. Please update the configuration to include a connection string and restart the server.".to_string(),
            None,
        )
    };

    Explanation {
        code,
        summary,
        next_step,
        preferred_action,
        oidc_prompt: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{AuthType, ConnectingState, OidcFlow};

    fn create_test_oidc_state() -> ConnectionState {
        ConnectionState::Connecting(ConnectingState {
            handle: None,
            auth_type: AuthType::OidcAuthFlow,
            oidc_flow: Some(OidcFlow {
                kind: AuthType::OidcDeviceFlow,
                login_url: Some("https://x/y".to_string()),
                user_code: Some("ABC-123".to_string()),
            }),
            atlas: None,
        })
    }

    fn not_connected() -> ConnectionError {
        ConnectionError::NotConnected("no connection".to_string())
    }

    #[test]
    fn test_cloud_action_is_preferred() {
        let actions = vec![
            RecoveryAction::generic("connect"),
            RecoveryAction::cloud_managed("atlas-connect-cluster"),
        ];
        let explanation = explain(&not_connected(), &actions, &ConnectionState::Disconnected);

        assert_eq!(explanation.preferred_action.as_deref(), Some("atlas-connect-cluster"));
        assert!(explanation.to_string().contains("atlas-connect-cluster"));
        assert!(!explanation.to_string().contains("\"connect\""));
    }

    #[test]
    fn test_generic_actions_are_listed() {
        let actions = vec![RecoveryAction::generic("connect"), RecoveryAction::generic("switch")];
        let text = explain(&not_connected(), &actions, &ConnectionState::Disconnected).to_string();

        assert!(text.contains("\"connect\", \"switch\""));
    }

    #[test]
    fn test_no_actions_asks_for_configuration() {
        let explanation = explain(&not_connected(), &[], &ConnectionState::Disconnected);
        assert!(explanation.next_step.contains("configuration"));
        assert!(explanation.preferred_action.is_none());
    }

    #[test]
    fn test_oidc_prompt_takes_priority() {
        let actions = vec![RecoveryAction::cloud_managed("atlas-connect-cluster")];
        let explanation = explain(&not_connected(), &actions, &create_test_oidc_state());
        let text = explanation.to_string();

        assert!(text.contains("https://x/y"));
        assert!(text.contains("ABC-123"));
        assert!(!text.contains("atlas-connect-cluster"));
        assert_eq!(
            explanation.oidc_prompt,
            Some(("https://x/y".to_string(), "ABC-123".to_string()))
        );
    }

    #[test]
    fn test_misconfigured_endpoint_warns_about_side_effects() {
        let error = ConnectionError::MisconfiguredEndpoint("bad host".to_string());
        let explanation = explain(&error, &[], &ConnectionState::Disconnected);

        assert_eq!(explanation.code, ErrorCode::MisconfiguredEndpoint);
        assert!(explanation.summary.contains("bad host"));
        assert_eq!(explanation.warnings.len(), 1);
        assert!(explanation.to_string().contains("$merge"));
    }

    #[test]
    fn test_non_connection_errors_are_unhandled() {
        let error = CoreError::config_error("bad");
        let guidance = classify(&error, &[], &ConnectionState::Disconnected);
        assert_eq!(guidance, Guidance::Unhandled);
        assert!(guidance.text().is_none());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let actions = vec![RecoveryAction::generic("connect")];
        let error: CoreError = not_connected().into();
        let first = classify(&error, &actions, &ConnectionState::Disconnected);
        let second = classify(&error, &actions, &ConnectionState::Disconnected);
        assert_eq!(first, second);
    }
}
