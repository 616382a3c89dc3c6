//! Huddle chat coordinator.
//!
//! Run with:
//! ```not_rust
//! HUDDLE_JWT_SECRET=dev cargo run --bin huddle-server -- serve --seed seed.json
//! HUDDLE_JWT_SECRET=dev cargo run --bin huddle-server -- token --user-id alice
//! ```

use std::sync::Arc;

use clap::Parser;
use huddle_server::{
    config::{Cli, Command, Config, TokenArgs},
    domain::UserId,
    infrastructure::{auth::JwtCredentialVerifier, repository::InMemoryStore, seed::SeedData},
    ui::{AppState, Server},
};
use huddle_shared::{logger::setup_logger, time::SystemClock};

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(Config::from(args)).await,
        Command::Token(args) => print_token(args),
    };
    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Storage (in-memory), optionally seeded
    let store = InMemoryStore::new();
    if let Some(path) = &config.seed {
        let seed = SeedData::load(path)?;
        tracing::info!(
            "Seeding {} user(s), {} conversation(s) from {}",
            seed.users.len(),
            seed.conversations.len(),
            path.display()
        );
        seed.apply(&store).await;
    }

    // 2. Use cases and shared state
    let state = AppState::in_memory(&config, store, Arc::new(SystemClock));
    tracing::info!(
        "Typing timeout {:?}, history limit {}",
        config.typing_timeout,
        config.history_limit
    );

    // 3. Server
    Server::new(state).run(config.host, config.port).await
}

fn print_token(args: TokenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = UserId::new(args.user_id)?;
    // The token command only signs; user lookup happens on the server
    let verifier = JwtCredentialVerifier::new(&args.jwt_secret, Arc::new(InMemoryStore::new()));
    let ttl_seconds = i64::try_from(args.ttl_hours.saturating_mul(3600))?;
    let token = verifier.issue_token(&user_id, ttl_seconds)?;
    println!("{}", token);
    Ok(())
}
