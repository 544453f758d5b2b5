//! Resources exposed to the transport layer
//!
//! Each resource is a reactive projection registered under a stable URI.
//! The transport serves `render()` output on reads and forwards
//! `ResourceUpdated` notifications to its subscribers.

pub mod debug;
pub mod history;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use mongosession_core::{ProjectionSink, RenderedResource, SinkError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::{Result, SessionError};

pub use debug::{debug_resource, DebugView, DEBUG_RESOURCE_URI};
pub use history::{history_resource, HistoryEntry, HistoryLog, HISTORY_RESOURCE_URI};

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// "Content changed, re-fetch" notification for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdated {
    pub uri: String,
}

/// Projection sink forwarding notifications over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ResourceUpdated>,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport reads from
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ResourceUpdated>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ProjectionSink for ChannelSink {
    async fn notify_changed(&self, uri: &str) -> core::result::Result<(), SinkError> {
        self.tx
            .send(ResourceUpdated {
                uri: uri.to_string(),
            })
            .map_err(|_| SinkError::ChannelClosed)
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Name and URI of a registered resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub uri: String,
}

/// Resources keyed by URI, in registration order
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<Vec<Arc<dyn RenderedResource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. URIs must be unique.
    pub fn register(&self, resource: Arc<dyn RenderedResource>) -> Result<()> {
        let mut resources = self
            .resources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if resources.iter().any(|existing| existing.uri() == resource.uri()) {
            return Err(SessionError::config_error(format!(
                "resource {} is already registered",
                resource.uri()
            )));
        }
        resources.push(resource);
        Ok(())
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn RenderedResource>> {
        self.resources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|resource| resource.uri() == uri)
            .cloned()
    }

    pub fn render(&self, uri: &str) -> Result<String> {
        self.get(uri)
            .map(|resource| resource.render())
            .ok_or_else(|| SessionError::resource_not_found(uri))
    }

    pub fn list(&self) -> Vec<ResourceDescriptor> {
        self.resources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|resource| ResourceDescriptor {
                name: resource.name().to_string(),
                uri: resource.uri().to_string(),
            })
            .collect()
    }

    /// Stop every resource from observing further events
    pub fn close_all(&self) {
        for resource in self
            .resources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
        {
            resource.close();
        }
    }
}
