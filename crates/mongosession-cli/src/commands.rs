//! Command handlers for the MongoDB session CLI

use std::sync::Arc;
use std::time::Duration;

use mongosession_runtime::{
    infer_auth_type, ChannelSink, ConnectionSettings, DiagnosticCommand, MongoDriver,
    RecoveryAction, Session, SessionContext, SessionError, StateTag, DEBUG_RESOURCE_URI,
    HISTORY_RESOURCE_URI,
};
use tracing::{debug, info, warn};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Recovery actions this binary can offer the user
fn recovery_actions() -> Vec<RecoveryAction> {
    vec![RecoveryAction::generic("mongosession connect")]
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<()> {
        match command {
            Commands::Connect {
                connection_string,
                ping,
                hold,
            } => Self::handle_connect_command(config, connection_string, ping, hold).await,
            Commands::DeviceId => Self::handle_device_id_command(config).await,
            Commands::AuthType { connection_string } => {
                println!("{}", infer_auth_type(&connection_string));
                Ok(())
            }
        }
    }

    /// Connect, optionally ping and hold, then report and disconnect
    async fn handle_connect_command(
        config: AppConfig,
        connection_string: Option<String>,
        ping: bool,
        hold: u64,
    ) -> Result<()> {
        let context = SessionContext::new(
            config.session.connection.app_name.clone(),
            config.session.identity.clone(),
        );
        let (sink, mut updates) = ChannelSink::channel();
        let session = Session::new(&context, Arc::new(MongoDriver::new()), config.session, sink)?;

        let watcher = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                debug!(uri = %update.uri, "Resource updated");
            }
        });

        let outcome = Self::run_connection(&session, connection_string, ping, hold).await;

        println!("{}", session.render(DEBUG_RESOURCE_URI)?);
        session.close().await;
        watcher.abort();
        println!("{}", session.render(HISTORY_RESOURCE_URI)?);

        outcome
    }

    async fn run_connection(
        session: &Session,
        connection_string: Option<String>,
        ping: bool,
        hold: u64,
    ) -> Result<()> {
        let connected = match connection_string {
            Some(connection_string) => {
                session
                    .connect(&ConnectionSettings::new(connection_string))
                    .await
            }
            None => session.connect_default().await,
        };
        let state = match connected {
            Ok(state) => state,
            Err(err) => return Err(Self::explained(session, err)),
        };

        if state.tag() == StateTag::Connecting {
            info!("Waiting for OIDC authentication to complete");
            let mut states = session.manager().watch_state();
            if let Err(err) = states
                .wait_for(|state| state.tag() != StateTag::Connecting)
                .await
            {
                warn!(error = %err, "Connection state stopped updating");
            };
        }

        let handle = match session.ensure_connected() {
            Ok(handle) => handle,
            Err(err) => return Err(Self::explained(session, err)),
        };
        info!("Connected to MongoDB");

        if ping {
            handle
                .run_diagnostic_command(DiagnosticCommand::Ping)
                .await
                .map_err(|e| CliError::Connection(e.to_string()))?;
            println!("ping: ok");
        }

        if hold > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(hold)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }

        Ok(())
    }

    async fn handle_device_id_command(config: AppConfig) -> Result<()> {
        let context = SessionContext::new(
            config.session.connection.app_name,
            config.session.identity,
        );
        let device_id = context.identity_resolver().resolve().await;
        context.release_identity_resolver();
        println!("{}", device_id);
        Ok(())
    }

    /// Replace a connection failure with actionable guidance when available
    fn explained(session: &Session, err: SessionError) -> CliError {
        match session.explain(&err, &recovery_actions()).text() {
            Some(text) => CliError::Connection(text),
            None => CliError::Session(err),
        }
    }
}
