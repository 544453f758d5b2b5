//! Test utilities for session-level tests
//!
//! The mock driver decides each outcome from the connection string host:
//! `unreachable` fails to connect, `badauth` fails the handshake and any
//! other host succeeds.

#![allow(dead_code)]

use async_trait::async_trait;
use mongosession_core::{
    DiagnosticCommand, Driver, DriverError, DriverHandle, DriverOptions, IdentityError,
    IdentitySource,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ----------------------------------------------------------------------------
// Mock Driver
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct HostHandle {
    fail_handshake: bool,
    pub closed: AtomicBool,
}

#[async_trait]
impl DriverHandle for HostHandle {
    async fn run_diagnostic_command(&self, _command: DiagnosticCommand) -> Result<(), DriverError> {
        if self.fail_handshake {
            return Err(DriverError::Command("Authentication failed.".to_string()));
        }
        Ok(())
    }

    async fn close(&self, _force: bool) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
pub struct HostDriver {
    pub connects: AtomicU32,
}

impl HostDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Driver for HostDriver {
    async fn connect(
        &self,
        connection_string: &str,
        _options: &DriverOptions,
    ) -> Result<Arc<dyn DriverHandle>, DriverError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if connection_string.contains("unreachable") {
            return Err(DriverError::Connect(
                "Server selection timed out".to_string(),
            ));
        }
        Ok(Arc::new(HostHandle {
            fail_handshake: connection_string.contains("badauth"),
            closed: AtomicBool::new(false),
        }))
    }
}

// ----------------------------------------------------------------------------
// Identity Sources
// ----------------------------------------------------------------------------

/// Identity source answering after a fixed delay
pub struct DelayedSource {
    pub value: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl IdentitySource for DelayedSource {
    async fn resolve(&self) -> Result<String, IdentityError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.value.to_string())
    }
}

/// Let spawned tasks run to their next suspension point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
