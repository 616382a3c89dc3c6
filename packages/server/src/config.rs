//! Command line and runtime configuration.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::usecase::{DEFAULT_HISTORY_LIMIT, DEFAULT_TYPING_TIMEOUT};

#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Real-time chat coordinator with presence, typing and read receipts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the coordinator
    Serve(ServeArgs),
    /// Mint an access token for local development
    Token(TokenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HUDDLE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "HUDDLE_PORT", default_value = "8080")]
    pub port: u16,

    /// HS256 secret used to verify access tokens
    #[arg(long, env = "HUDDLE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Inactivity window before a typing indicator expires
    #[arg(long, default_value_t = DEFAULT_TYPING_TIMEOUT.as_millis() as u64)]
    pub typing_timeout_ms: u64,

    /// Number of recent messages sent when joining a conversation
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// JSON fixture of users, conversations and participants to preload
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TokenArgs {
    /// HS256 secret shared with the server
    #[arg(long, env = "HUDDLE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long)]
    pub user_id: String,

    #[arg(long, default_value_t = 24)]
    pub ttl_hours: u64,
}

/// Settings the coordinator runs with
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub typing_timeout: Duration,
    pub history_limit: usize,
    pub seed: Option<PathBuf>,
}

impl Config {
    /// Config for tests and embedding: loopback, ephemeral port, defaults
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: jwt_secret.into(),
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            seed: None,
        }
    }
}

impl From<ServeArgs> for Config {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            jwt_secret: args.jwt_secret,
            typing_timeout: Duration::from_millis(args.typing_timeout_ms),
            history_limit: args.history_limit,
            seed: args.seed,
        }
    }
}
