//! MongoDB driver backend
//!
//! Implements the core `Driver` boundary on top of the official `mongodb`
//! crate. The client connects lazily; the state machine's handshake is the
//! first round trip to the server.
//!
//! OIDC authentication is left to the client's built-in providers, selected
//! through the `ENVIRONMENT` auth mechanism property. This driver registers
//! no human-flow callback, so it never invokes the device-flow notifier and
//! ignores `allowed_flows`. `Connecting` states carrying a login URL and user
//! code only come from drivers that run the interactive flow themselves.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use mongosession_core::{DiagnosticCommand, Driver, DriverError, DriverHandle, DriverOptions};
use tracing::{debug, info};

/// Driver creating `mongodb::Client`s
#[derive(Debug, Clone, Default)]
pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for MongoDriver {
    async fn connect(
        &self,
        connection_string: &str,
        options: &DriverOptions,
    ) -> Result<Arc<dyn DriverHandle>, DriverError> {
        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| DriverError::Connect(e.to_string()))?;

        if client_options.app_name.is_none() && !options.app_name.is_empty() {
            client_options.app_name = Some(options.app_name.clone());
        }
        if options.oidc.is_some() {
            debug!(
                "Interactive OIDC flows unsupported, relying on the client's OIDC environment provider"
            );
        }

        let client =
            Client::with_options(client_options).map_err(|e| DriverError::Connect(e.to_string()))?;

        info!("Created MongoDB client");
        Ok(Arc::new(MongoHandle { client }))
    }
}

/// Live `mongodb::Client`
#[derive(Debug, Clone)]
pub struct MongoHandle {
    client: Client,
}

impl MongoHandle {
    /// Get the raw MongoDB client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl DriverHandle for MongoHandle {
    async fn run_diagnostic_command(&self, command: DiagnosticCommand) -> Result<(), DriverError> {
        let command = match command {
            DiagnosticCommand::Hello => doc! { "hello": 1 },
            DiagnosticCommand::Ping => doc! { "ping": 1 },
        };
        self.client
            .database("admin")
            .run_command(command)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Command(e.to_string()))
    }

    async fn close(&self, force: bool) -> Result<(), DriverError> {
        self.client.clone().shutdown().immediate(force).await;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
