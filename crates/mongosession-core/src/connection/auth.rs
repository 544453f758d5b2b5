//! Connection string inspection
//!
//! Pure helpers over the query parameters of a `mongodb://` or
//! `mongodb+srv://` connection string.

use url::form_urlencoded;

use super::state::AuthType;
use crate::errors::ConnectionError;

const SCHEME_STANDARD: &str = "mongodb://";
const SCHEME_SRV: &str = "mongodb+srv://";

/// Query string of a connection string, without the leading `?`
fn query_of(connection_string: &str) -> &str {
    let rest = match connection_string.split_once('?') {
        Some((_, query)) => query,
        None => return "",
    };
    rest.split('#').next().unwrap_or("")
}

/// Look up a query parameter. Option names are matched case-insensitively.
pub fn query_param(connection_string: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query_of(connection_string).as_bytes())
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.into_owned())
}

/// Infer the authentication mechanism implied by a connection string.
///
/// Both OIDC flows report `OidcAuthFlow`; the device flow is only observed
/// when the driver prompts for it.
pub fn infer_auth_type(connection_string: &str) -> AuthType {
    let mechanism = query_param(connection_string, "authMechanism")
        .map(|value| value.to_ascii_uppercase());

    match mechanism.as_deref() {
        Some("MONGODB-OIDC") => AuthType::OidcAuthFlow,
        Some("MONGODB-X509") => AuthType::X509,
        Some("GSSAPI") => AuthType::Kerberos,
        Some("PLAIN") => {
            match query_param(connection_string, "authSource").as_deref() {
                Some("$external") => AuthType::Ldap,
                _ => AuthType::Scram,
            }
        }
        _ => AuthType::Scram,
    }
}

/// Validate the scheme and inject `appName` when the string lacks one.
///
/// Returns a new string; the input is left untouched.
pub fn normalize_connection_string(
    connection_string: &str,
    app_name: &str,
) -> Result<String, ConnectionError> {
    let trimmed = connection_string.trim();
    if trimmed.is_empty() {
        return Err(ConnectionError::MisconfiguredEndpoint(
            "connection string must not be empty".to_string(),
        ));
    }

    let scheme_len = if trimmed.starts_with(SCHEME_SRV) {
        SCHEME_SRV.len()
    } else if trimmed.starts_with(SCHEME_STANDARD) {
        SCHEME_STANDARD.len()
    } else {
        return Err(ConnectionError::MisconfiguredEndpoint(format!(
            "invalid scheme, expected connection string to start with \"{}\" or \"{}\"",
            SCHEME_STANDARD, SCHEME_SRV
        )));
    };

    let authority = trimmed[scheme_len..]
        .split(['/', '?'])
        .next()
        .unwrap_or("");
    if authority.is_empty() {
        return Err(ConnectionError::MisconfiguredEndpoint(
            "connection string does not specify a host".to_string(),
        ));
    }

    if app_name.is_empty() || query_param(trimmed, "appName").is_some() {
        return Ok(trimmed.to_string());
    }

    // form_urlencoded escapes a literal '+' as %2B, so any '+' left is a space
    let encoded: String = form_urlencoded::byte_serialize(app_name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");

    let mut normalized = trimmed.to_string();
    if let Some(position) = normalized.find('?') {
        let query = &normalized[position + 1..];
        if !query.is_empty() && !query.ends_with('&') {
            normalized.push('&');
        }
    } else {
        let after_scheme = &normalized[scheme_len..];
        if !after_scheme.contains('/') {
            normalized.push('/');
        }
        normalized.push('?');
    }
    normalized.push_str("appName=");
    normalized.push_str(&encoded);

    Ok(normalized)
}
