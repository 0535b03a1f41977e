use clap::Parser;

use quizparty_client::network;
use quizparty_client::readiness;
use quizparty_client::status::NetworkStatus;
use quizparty_common::protocol::{ClientMessage, ServerMessage};
use quizparty_common::retry::RetryPolicy;

/// Quizparty client - join a quiz room from the terminal
#[derive(Parser, Debug)]
#[command(name = "quizparty-client", version, about)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:9321")]
    server: String,

    /// Player name
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Create a new room and print its code
    #[arg(long, conflicts_with = "join")]
    create: bool,

    /// Join an existing room by code
    #[arg(long)]
    join: Option<String>,

    /// Watch a room's events without joining its roster
    #[arg(long, conflicts_with_all = ["create", "join"])]
    watch: Option<String>,

    /// Room capacity when creating
    #[arg(long, default_value_t = 4)]
    max_players: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizparty_client=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let status = NetworkStatus::new();
    let policy = RetryPolicy::default();
    let ready = readiness::wait_api_ready(&args.server, &status, &policy).await;
    if !ready.health_ok {
        anyhow::bail!("server at {} is not responding, giving up", args.server);
    }
    if !ready.initial_ok {
        tracing::warn!("Initial data fetch failed; continuing with a degraded start");
    }

    if !args.create && args.join.is_none() && args.watch.is_none() {
        let rooms = network::fetch_room_list(&args.server, &status).await?;
        if rooms.is_empty() {
            println!("No open rooms. Use --create to start one.");
        } else {
            println!("Open rooms:");
            for r in rooms {
                println!(
                    "  {}  {}/{} players  (owner: {})",
                    r.code, r.player_count, r.max_players, r.owner_name
                );
            }
        }
        return Ok(());
    }

    let (tx, mut rx) = network::connect(&args.server).await?;

    tx.send(ClientMessage::Hello {
        player_name: args.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .await?;

    match rx.recv().await {
        Some(ServerMessage::Welcome { conn_id, .. }) => {
            tracing::debug!("Connected as {}", conn_id);
        }
        Some(ServerMessage::HandshakeError { reason }) => {
            anyhow::bail!("handshake rejected: {}", reason);
        }
        other => anyhow::bail!("unexpected handshake reply: {:?}", other),
    }

    if args.create {
        tx.send(ClientMessage::CreateRoom {
            owner_name: args.name.clone(),
            max_players: args.max_players,
        })
        .await?;
    } else if let Some(code) = &args.join {
        tx.send(ClientMessage::JoinRoom {
            code: code.clone(),
            name: args.name.clone(),
        })
        .await?;
    } else if let Some(code) = &args.watch {
        tx.send(ClientMessage::WatchRoom { code: code.clone() }).await?;
    }

    // Print pushed room events until the room goes away.
    while let Some(msg) = rx.recv().await {
        match msg {
            ServerMessage::RoomCreated { room } => {
                println!("Room created: {} (share this code)", room.code);
            }
            ServerMessage::Snapshot { room, players, round } => {
                println!("Room {} [{:?}], {} player(s)", room.code, room.status, players.len());
                if let Some(round) = round {
                    println!("  Round {} in progress ({}s)", round.round_no, round.seconds);
                }
            }
            ServerMessage::PlayerJoined { players } => {
                println!("Player joined ({} total)", players.len());
            }
            ServerMessage::ReadyChanged { players } => {
                let ready = players.iter().filter(|p| p.is_ready).count();
                println!("Ready: {}/{}", ready, players.len());
            }
            ServerMessage::RoundStarted { round } => {
                println!("Round {} started! Quiz {} ({}s)", round.round_no, round.quiz_id, round.seconds);
            }
            ServerMessage::TimerTick { seconds } => {
                if seconds % 10 == 0 || seconds <= 5 {
                    println!("  {}s left", seconds);
                }
            }
            ServerMessage::GuessResult { name, guess, correct, .. } => {
                let mark = if correct { "correct" } else { "wrong" };
                println!("{} guessed \"{}\" - {}", name, guess, mark);
            }
            ServerMessage::PlayerLeft { name, .. } => {
                println!("{} left the room", name);
            }
            ServerMessage::PlayerOut { name, .. } => {
                println!("{} disconnected mid-game", name);
            }
            ServerMessage::OwnerChanged { players } => {
                if let Some(owner) = players.iter().find(|p| p.is_owner) {
                    println!("{} is now the room owner", owner.name);
                }
            }
            ServerMessage::GameOver { winner, leaderboard } => {
                match winner {
                    Some(w) => println!("Game over! Winner: {} ({} points)", w.name, w.score),
                    None => println!("Game over, no winner."),
                }
                for (i, entry) in leaderboard.iter().enumerate() {
                    println!("  {}. {} - {}", i + 1, entry.name, entry.score);
                }
                break;
            }
            ServerMessage::RoomClosed => {
                println!("Room closed.");
                break;
            }
            ServerMessage::Error { code, message } => {
                eprintln!("Error ({:?}): {}", code, message);
                break;
            }
            _ => {}
        }
    }

    tx.send(ClientMessage::Disconnect).await.ok();
    Ok(())
}
