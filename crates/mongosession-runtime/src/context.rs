//! Process-wide session context
//!
//! Owns the single `IdentityResolver` a process may have. Sessions borrow
//! the resolver from the context instead of creating their own.

use std::sync::{Arc, Mutex};

use mongosession_core::{IdentityConfig, IdentityResolver, IdentitySource, MachineIdSource};
use tracing::debug;

use crate::errors::{Result, SessionError};

/// Process-wide owner of shared session resources
pub struct SessionContext {
    app_name: String,
    identity_config: IdentityConfig,
    identity: Mutex<Option<IdentityResolver>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("app_name", &self.app_name)
            .field("identity_active", &self.has_identity_resolver())
            .finish()
    }
}

impl SessionContext {
    pub fn new<S: Into<String>>(app_name: S, identity_config: IdentityConfig) -> Arc<Self> {
        Arc::new(Self {
            app_name: app_name.into(),
            identity_config,
            identity: Mutex::new(None),
        })
    }

    /// The active resolver, created with the machine-id source on first use
    pub fn identity_resolver(&self) -> IdentityResolver {
        let mut identity = self.lock_identity();
        identity
            .get_or_insert_with(|| {
                debug!("Creating machine-id identity resolver");
                IdentityResolver::new(
                    Arc::new(MachineIdSource::new(self.app_name.clone())),
                    self.identity_config.clone(),
                )
            })
            .clone()
    }

    /// Install a resolver backed by `source`.
    ///
    /// Fails with `IdentityResolverActive` while another resolver exists.
    pub fn install_identity_resolver(
        &self,
        source: Arc<dyn IdentitySource>,
    ) -> Result<IdentityResolver> {
        let mut identity = self.lock_identity();
        if identity.is_some() {
            return Err(SessionError::IdentityResolverActive);
        }
        let resolver = IdentityResolver::new(source, self.identity_config.clone());
        *identity = Some(resolver.clone());
        Ok(resolver)
    }

    /// Close and remove the active resolver, cancelling any resolution
    pub fn release_identity_resolver(&self) {
        if let Some(resolver) = self.lock_identity().take() {
            resolver.close();
        }
    }

    pub fn has_identity_resolver(&self) -> bool {
        self.lock_identity().is_some()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    fn lock_identity(&self) -> std::sync::MutexGuard<'_, Option<IdentityResolver>> {
        self.identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mongosession_core::IdentityError;

    struct FixedSource(&'static str);

    #[async_trait]
    impl IdentitySource for FixedSource {
        async fn resolve(&self) -> core::result::Result<String, IdentityError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_second_resolver_is_rejected() {
        let context = SessionContext::new("app", IdentityConfig::default());

        context
            .install_identity_resolver(Arc::new(FixedSource("a")))
            .unwrap();
        let second = context.install_identity_resolver(Arc::new(FixedSource("b")));

        assert!(matches!(second, Err(SessionError::IdentityResolverActive)));
    }

    #[tokio::test]
    async fn test_release_allows_new_resolver() {
        let context = SessionContext::new("app", IdentityConfig::default());
        let first = context
            .install_identity_resolver(Arc::new(FixedSource("a")))
            .unwrap();
        assert_eq!(first.resolve().await, "a");

        context.release_identity_resolver();
        assert!(!context.has_identity_resolver());

        let second = context
            .install_identity_resolver(Arc::new(FixedSource("b")))
            .unwrap();
        assert_eq!(second.resolve().await, "b");
        assert_eq!(context.identity_resolver().resolve().await, "b");
    }

    #[test]
    fn test_default_resolver_is_shared() {
        let context = SessionContext::new("app", IdentityConfig::default());
        context.identity_resolver();

        assert!(context.has_identity_resolver());
        assert!(matches!(
            context.install_identity_resolver(Arc::new(FixedSource("x"))),
            Err(SessionError::IdentityResolverActive)
        ));
    }
}
