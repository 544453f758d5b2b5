//! `debug://mongodb` resource
//!
//! Summarises the current connection for an assistant: status, auth type,
//! outstanding OIDC prompt, last error and target cluster.

use std::sync::Arc;

use mongosession_core::{
    AuthType, ConnectionEvent, ConnectionState, EventBroadcaster, EventKind, ProjectionSink,
    ReactiveProjection, StateTag,
};

use crate::errors::Result;

pub const DEBUG_RESOURCE_URI: &str = "debug://mongodb";
const DEBUG_RESOURCE_NAME: &str = "debug-mongodb";

/// Derived view of the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugView {
    pub tag: StateTag,
    pub auth_type: Option<AuthType>,
    pub oidc_login_url: Option<String>,
    pub oidc_user_code: Option<String>,
    pub error_reason: Option<String>,
    pub cluster_name: Option<String>,
}

impl Default for DebugView {
    fn default() -> Self {
        Self {
            tag: StateTag::Disconnected,
            auth_type: None,
            oidc_login_url: None,
            oidc_user_code: None,
            error_reason: None,
            cluster_name: None,
        }
    }
}

impl DebugView {
    fn from_state(state: &ConnectionState) -> Self {
        let flow = state.oidc_flow();
        Self {
            tag: state.tag(),
            auth_type: state.auth_type(),
            oidc_login_url: flow.and_then(|flow| flow.login_url.clone()),
            oidc_user_code: flow.and_then(|flow| flow.user_code.clone()),
            error_reason: match state {
                ConnectionState::Errored(errored) => Some(errored.reason.clone()),
                _ => None,
            },
            cluster_name: state.atlas().map(|atlas| atlas.cluster_name.clone()),
        }
    }
}

/// Fold a connection event into the debug view
pub fn fold(event: &ConnectionEvent, previous: &DebugView) -> DebugView {
    match event {
        // A request only replaces the view when it carries a connecting state;
        // otherwise the previous state stays authoritative
        ConnectionEvent::Requested(state @ ConnectionState::Connecting(_)) => {
            DebugView::from_state(state)
        }
        ConnectionEvent::Requested(_) => previous.clone(),
        ConnectionEvent::Succeeded(connected) => {
            DebugView::from_state(&ConnectionState::Connected(connected.clone()))
        }
        ConnectionEvent::TimedOut(errored) | ConnectionEvent::Errored(errored) => {
            DebugView::from_state(&ConnectionState::Errored(errored.clone()))
        }
        ConnectionEvent::Closed => DebugView::default(),
    }
}

/// Render the view as tagged text
pub fn render(view: &DebugView) -> String {
    let mut out = String::from("Below are the debugging details for the MongoDB connection.\n\n");

    let status = match view.tag {
        StateTag::Connected => "The user is connected to the MongoDB cluster.",
        StateTag::Connecting => "The user is in the process of connecting to the MongoDB cluster.",
        StateTag::Errored => "The user is not connected to a MongoDB cluster because of an error.",
        StateTag::Disconnected => "The user is not connected to a MongoDB cluster.",
    };
    out.push_str(status);
    out.push('\n');
    out.push_str(&format!("<connection-status>{}</connection-status>\n", view.tag));

    if let Some(auth_type) = view.auth_type {
        out.push_str(&format!("<auth-type>{}</auth-type>\n", auth_type));
    }
    if let Some(cluster) = &view.cluster_name {
        out.push_str(&format!("<atlas-cluster>{}</atlas-cluster>\n", cluster));
    }
    if let (Some(url), Some(code)) = (&view.oidc_login_url, &view.oidc_user_code) {
        out.push_str(&format!(
            "The user must open <oidc-login-url>{}</oidc-login-url> and enter the code <oidc-user-code>{}</oidc-user-code> to complete authentication.\n",
            url, code
        ));
    }
    if let Some(reason) = &view.error_reason {
        out.push_str(&format!("<error>{}</error>\n", reason));
    }

    out
}

/// Attach the debug projection to a broadcaster
pub fn debug_resource(
    broadcaster: &EventBroadcaster,
    sink: Arc<dyn ProjectionSink>,
) -> Result<ReactiveProjection<DebugView>> {
    let projection = ReactiveProjection::builder(DEBUG_RESOURCE_NAME, DEBUG_RESOURCE_URI, DebugView::default())
        .events([
            EventKind::Requested,
            EventKind::Succeeded,
            EventKind::TimedOut,
            EventKind::Closed,
            EventKind::Errored,
        ])
        .fold(fold)
        .render(render)
        .sink(sink)
        .attach(broadcaster)?;
    Ok(projection)
}
