//! Device identity resolution
//!
//! Resolves a stable machine identity at most once. Concurrent callers share
//! the in-flight resolution. Timeouts and source failures resolve to
//! `UNKNOWN_DEVICE_ID` instead of an error, since identity only enriches
//! telemetry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::IdentityConfig;
use crate::errors::IdentityError;

/// Sentinel reported when no identity could be resolved
pub const UNKNOWN_DEVICE_ID: &str = "unknown";

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

// ----------------------------------------------------------------------------
// Identity Sources
// ----------------------------------------------------------------------------

/// Provider of the raw device identity
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn resolve(&self) -> Result<String, IdentityError>;
}

/// Reads the host machine id and hashes it with the application name, so the
/// raw id never leaves the process
#[derive(Debug, Clone)]
pub struct MachineIdSource {
    app_name: String,
    paths: Vec<PathBuf>,
}

impl MachineIdSource {
    pub fn new<S: Into<String>>(app_name: S) -> Self {
        Self {
            app_name: app_name.into(),
            paths: MACHINE_ID_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Override the files probed for a machine id, in order
    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    fn digest(&self, machine_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.app_name.as_bytes());
        hasher.update(b":");
        hasher.update(machine_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl IdentitySource for MachineIdSource {
    async fn resolve(&self) -> Result<String, IdentityError> {
        for path in &self.paths {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => {
                    let machine_id = contents.trim();
                    if !machine_id.is_empty() {
                        return Ok(self.digest(machine_id));
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(IdentityError::Io(err)),
            }
        }
        Err(IdentityError::Unavailable(
            "no machine id file found".to_string(),
        ))
    }
}

// ----------------------------------------------------------------------------
// Identity Resolver
// ----------------------------------------------------------------------------

enum ResolverState {
    Unresolved,
    Resolving {
        generation: u64,
        token: CancellationToken,
        pending: Shared<BoxFuture<'static, String>>,
    },
    Resolved(String),
}

struct ResolverInner {
    source: Arc<dyn IdentitySource>,
    config: IdentityConfig,
    state: Mutex<ResolverState>,
    generation: AtomicU64,
}

/// Once-only, timeout-bounded identity resolution
#[derive(Clone)]
pub struct IdentityResolver {
    inner: Arc<ResolverInner>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("config", &self.inner.config)
            .field("resolved", &self.resolved())
            .finish()
    }
}

impl IdentityResolver {
    pub fn new(source: Arc<dyn IdentitySource>, config: IdentityConfig) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                source,
                config,
                state: Mutex::new(ResolverState::Unresolved),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Resolve the identity, starting a resolution if none is in flight
    pub async fn resolve(&self) -> String {
        let (generation, pending) = {
            let mut state = self.lock_state();
            match &*state {
                ResolverState::Resolved(identity) => return identity.clone(),
                ResolverState::Resolving {
                    generation,
                    pending,
                    ..
                } => (*generation, pending.clone()),
                ResolverState::Unresolved => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let token = CancellationToken::new();
                    let pending = self.start(token.clone());
                    *state = ResolverState::Resolving {
                        generation,
                        token,
                        pending: pending.clone(),
                    };
                    (generation, pending)
                }
            }
        };

        let identity = pending.await;

        let mut state = self.lock_state();
        if let ResolverState::Resolving { generation: current, .. } = &*state {
            if *current == generation {
                *state = ResolverState::Resolved(identity.clone());
            }
        }
        identity
    }

    /// Cached identity, if resolution has completed
    pub fn resolved(&self) -> Option<String> {
        match &*self.lock_state() {
            ResolverState::Resolved(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    pub fn is_resolving(&self) -> bool {
        matches!(&*self.lock_state(), ResolverState::Resolving { .. })
    }

    /// Cancel any in-flight resolution and forget the cached identity
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ResolverState::Unresolved);
        if let ResolverState::Resolving { token, .. } = previous {
            token.cancel();
        }
    }

    fn start(&self, token: CancellationToken) -> Shared<BoxFuture<'static, String>> {
        let source = Arc::clone(&self.inner.source);
        let timeout = self.inner.config.timeout;

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!("Device identity resolution cancelled");
                    UNKNOWN_DEVICE_ID.to_string()
                }
                result = tokio::time::timeout(timeout, source.resolve()) => match result {
                    Ok(Ok(identity)) => identity,
                    Ok(Err(err)) => {
                        debug!(error = %err, "Failed to resolve device identity, using fallback");
                        UNKNOWN_DEVICE_ID.to_string()
                    }
                    Err(_) => {
                        debug!(
                            timeout_ms = timeout.as_millis() as u64,
                            "Device identity resolution timed out, using fallback"
                        );
                        UNKNOWN_DEVICE_ID.to_string()
                    }
                },
            }
        });

        async move {
            task.await
                .unwrap_or_else(|_| UNKNOWN_DEVICE_ID.to_string())
        }
        .boxed()
        .shared()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicU32,
        delay: Duration,
        result: Result<&'static str, &'static str>,
    }

    impl CountingSource {
        fn new(delay: Duration, result: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay,
                result,
            })
        }
    }

    #[async_trait]
    impl IdentitySource for CountingSource {
        async fn resolve(&self) -> Result<String, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result
                .map(str::to_string)
                .map_err(|reason| IdentityError::Unavailable(reason.to_string()))
        }
    }

    fn create_test_resolver(source: Arc<CountingSource>, timeout_ms: u64) -> IdentityResolver {
        IdentityResolver::new(
            source,
            IdentityConfig::default().with_timeout(Duration::from_millis(timeout_ms)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_and_caches() {
        let source = CountingSource::new(Duration::from_millis(10), Ok("device-1"));
        let resolver = create_test_resolver(Arc::clone(&source), 1000);

        assert_eq!(resolver.resolve().await, "device-1");
        assert_eq!(resolver.resolve().await, "device-1");
        assert_eq!(resolver.resolved().as_deref(), Some("device-1"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_once_for_concurrent_callers() {
        let source = CountingSource::new(Duration::from_secs(60), Ok("late"));
        let resolver = create_test_resolver(Arc::clone(&source), 3000);

        let (a, b, c) = tokio::join!(resolver.resolve(), resolver.resolve(), resolver.resolve());

        assert_eq!(a, UNKNOWN_DEVICE_ID);
        assert_eq!(b, UNKNOWN_DEVICE_ID);
        assert_eq!(c, UNKNOWN_DEVICE_ID);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.resolved().as_deref(), Some(UNKNOWN_DEVICE_ID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_failure_falls_back() {
        let source = CountingSource::new(Duration::from_millis(1), Err("no id"));
        let resolver = create_test_resolver(source, 1000);

        assert_eq!(resolver.resolve().await, UNKNOWN_DEVICE_ID);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_and_resets() {
        let source = CountingSource::new(Duration::from_millis(500), Ok("device-1"));
        let resolver = create_test_resolver(Arc::clone(&source), 1000);

        let pending = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(resolver.is_resolving());

        resolver.close();
        assert_eq!(pending.await.unwrap(), UNKNOWN_DEVICE_ID);
        assert!(resolver.resolved().is_none());

        // Starts fresh
        assert_eq!(resolver.resolve().await, "device-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_machine_id_source_hashes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-id");
        tokio::fs::write(&path, "abc123\n").await.unwrap();

        let source = MachineIdSource::new("app").with_paths([dir.path().join("missing"), path.clone()]);
        let identity = source.resolve().await.unwrap();

        assert_eq!(identity.len(), 64);
        assert_ne!(identity, "abc123");
        assert_eq!(identity, source.resolve().await.unwrap());

        let other_app = MachineIdSource::new("other").with_paths([path]);
        assert_ne!(identity, other_app.resolve().await.unwrap());
    }

    #[tokio::test]
    async fn test_machine_id_source_missing_files() {
        let source = MachineIdSource::new("app").with_paths(["/nonexistent/mongosession/machine-id"]);
        assert!(matches!(
            source.resolve().await,
            Err(IdentityError::Unavailable(_))
        ));
    }
}
