//! CLI configuration management
//!
//! Configuration is loaded from a TOML file when one is given, otherwise
//! defaults apply. Command line flags override file values.
//!
//! ```toml
//! verbose = false
//!
//! [session]
//! idle_timeout = 600000
//! history_limit = 50
//! default_connection_string = "mongodb://localhost:27017"
//!
//! [session.connection]
//! app_name = "mongosession"
//! handshake_timeout = 30000
//! oidc_browser_flow = false
//!
//! [session.identity]
//! timeout = 3000
//! ```

use std::path::Path;

use mongosession_runtime::SessionConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// Complete configuration for the CLI application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Enable verbose logging output
    pub verbose: bool,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named on the command line, or defaults, then apply flags
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        Ok(config)
    }

    /// Command line flags take precedence over file values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            self.verbose = true;
        }
        if let Some(app_name) = &cli.app_name {
            self.session.connection.app_name = app_name.clone();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.connection.app_name.trim().is_empty() {
            return Err(CliError::Config("app_name cannot be empty".to_string()));
        }
        if self.session.connection.handshake_timeout.is_zero() {
            return Err(CliError::Config(
                "handshake_timeout must be greater than zero".to_string(),
            ));
        }
        if self.session.history_limit == 0 {
            return Err(CliError::Config(
                "history_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
