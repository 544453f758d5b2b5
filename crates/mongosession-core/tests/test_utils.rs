//! Test utilities for the connection state machine
//!
//! This module provides a scriptable mock driver, a recording projection
//! sink and event recorders so lifecycle tests run without a MongoDB server.

#![allow(dead_code)]

use async_trait::async_trait;
use mongosession_core::{
    ConnectionEvent, DeviceFlowPrompt, DiagnosticCommand, Driver, DriverError, DriverHandle,
    DriverOptions, EventBroadcaster, EventKind, ProjectionSink, SinkError,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Mock Driver
// ----------------------------------------------------------------------------

/// Outcome of the post-connect handshake on a mock handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeBehavior {
    Succeed,
    Fail(String),
    /// Never completes
    Hang,
    /// Succeeds after a delay
    Delay(Duration),
    /// Fails after a delay
    FailAfter(Duration, String),
}

/// Scripted behavior for the next connects
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub connect_error: Option<String>,
    pub handshake: HandshakeBehavior,
    pub close_error: Option<String>,
    /// Reported through the OIDC notifier while `connect` is pending
    pub device_prompt: Option<DeviceFlowPrompt>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            connect_error: None,
            handshake: HandshakeBehavior::Succeed,
            close_error: None,
            device_prompt: None,
        }
    }
}

/// Mock handle recording the commands it receives
#[derive(Debug)]
pub struct MockHandle {
    pub id: u64,
    pub connection_string: String,
    handshake: HandshakeBehavior,
    close_error: Option<String>,
    pub commands: AtomicU32,
    pub close_calls: AtomicU32,
    pub closed: AtomicBool,
}

#[async_trait]
impl DriverHandle for MockHandle {
    async fn run_diagnostic_command(&self, _command: DiagnosticCommand) -> Result<(), DriverError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        match &self.handshake {
            HandshakeBehavior::Succeed => Ok(()),
            HandshakeBehavior::Fail(message) => Err(DriverError::Command(message.clone())),
            HandshakeBehavior::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
            HandshakeBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            HandshakeBehavior::FailAfter(delay, message) => {
                tokio::time::sleep(*delay).await;
                Err(DriverError::Command(message.clone()))
            }
        }
    }

    async fn close(&self, _force: bool) -> Result<(), DriverError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        match &self.close_error {
            Some(message) => Err(DriverError::Close(message.clone())),
            None => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scriptable driver for deterministic lifecycle tests
#[derive(Default)]
pub struct MockDriver {
    behavior: Mutex<MockBehavior>,
    next_id: AtomicU64,
    pub connect_calls: AtomicU32,
    handles: Mutex<Vec<Arc<MockHandle>>>,
    last_options: Mutex<Option<DriverOptions>>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Arc<Self> {
        let driver = Self::default();
        *driver.behavior.lock().unwrap() = behavior;
        Arc::new(driver)
    }

    /// Replace the behavior used by subsequent connects
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn handles(&self) -> Vec<Arc<MockHandle>> {
        self.handles.lock().unwrap().clone()
    }

    pub fn last_handle(&self) -> Option<Arc<MockHandle>> {
        self.handles.lock().unwrap().last().cloned()
    }

    pub fn last_options(&self) -> Option<DriverOptions> {
        self.last_options.lock().unwrap().clone()
    }

    /// Handles neither closed nor failed
    pub fn open_handles(&self) -> usize {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .filter(|handle| !handle.closed.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(
        &self,
        connection_string: &str,
        options: &DriverOptions,
    ) -> Result<Arc<dyn DriverHandle>, DriverError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        let behavior = self.behavior.lock().unwrap().clone();

        if let Some(prompt) = behavior.device_prompt {
            if let Some(notifier) = options
                .oidc
                .as_ref()
                .and_then(|oidc| oidc.device_flow_notifier.clone())
            {
                notifier(prompt);
            }
        }

        if let Some(message) = behavior.connect_error {
            return Err(DriverError::Connect(message));
        }

        let handle = Arc::new(MockHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            connection_string: connection_string.to_string(),
            handshake: behavior.handshake,
            close_error: behavior.close_error,
            commands: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        });
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

// ----------------------------------------------------------------------------
// Event Recording
// ----------------------------------------------------------------------------

/// Record every event of every kind, in emission order
pub fn record_events(broadcaster: &EventBroadcaster) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = Arc::clone(&events);
        broadcaster.subscribe(
            kind,
            Arc::new(move |event: &ConnectionEvent| sink.lock().unwrap().push(event.clone())),
        );
    }
    events
}

pub fn kinds(events: &Arc<Mutex<Vec<ConnectionEvent>>>) -> Vec<EventKind> {
    events.lock().unwrap().iter().map(|event| event.kind()).collect()
}

// ----------------------------------------------------------------------------
// Recording Sink
// ----------------------------------------------------------------------------

/// Projection sink that records notified URIs, optionally failing each call
#[derive(Default)]
pub struct RecordingSink {
    pub notifications: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

#[async_trait]
impl ProjectionSink for RecordingSink {
    async fn notify_changed(&self, uri: &str) -> Result<(), SinkError> {
        self.notifications.lock().unwrap().push(uri.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::ChannelClosed);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Scheduling Helpers
// ----------------------------------------------------------------------------

/// Let spawned tasks run to their next suspension point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
