//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, env = "MONGOSESSION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Application name sent to the server and used to key the device id
    #[arg(long, env = "MONGOSESSION_APP_NAME")]
    pub app_name: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Connect, report the connection state and disconnect
    Connect {
        /// Connection string; falls back to the configured default
        #[arg(env = "MONGODB_URI")]
        connection_string: Option<String>,
        /// Ping the server once connected
        #[arg(short, long)]
        ping: bool,
        /// Keep the session open for this many seconds before disconnecting
        #[arg(long, default_value_t = 0)]
        hold: u64,
    },
    /// Print the stable device identifier
    DeviceId,
    /// Print the authentication mechanism a connection string selects
    AuthType {
        connection_string: String,
    },
}
