mod broadcast;
mod connection;
mod handler;
mod quiz;
mod registry;
mod room;
mod rounds;
mod server;

use std::net::SocketAddr;

use clap::Parser;

use quizparty_common::rules::GameRules;

/// Quizparty server - multiplayer quiz room server
#[derive(Parser, Debug)]
#[command(name = "quizparty-server", version, about)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:9321")]
    bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, default_value_t = 100)]
    max_connections: usize,

    /// Time budget per round, in seconds
    #[arg(long, default_value_t = 60)]
    round_seconds: u32,

    /// Quiz difficulty level
    #[arg(long, default_value_t = 1)]
    level: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizparty_server=debug,quizparty_common=debug".into()),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args.bind.parse()?;
    let rules = GameRules {
        round_seconds: args.round_seconds,
        level: args.level,
        ..GameRules::default()
    };

    tracing::info!(
        "Starting quizparty server on {} (max {} connections, {}s rounds)",
        addr,
        args.max_connections,
        rules.round_seconds
    );
    server::run(addr, rules, args.max_connections).await
}
