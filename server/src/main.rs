use clap::Parser;
use log::{error, info};
use server::config::GameConfig;
use server::network::{Server, ServerMessage};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "CSMA/CD channel-sharing game server")]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Seconds without a packet before a client is dropped
    #[arg(long, default_value = "5")]
    client_timeout: u64,

    /// Length of a game in seconds
    #[arg(short, long, default_value_t = shared::GAME_DURATION_SECS)]
    game_duration: u64,

    /// Time a successful packet occupies the channel, in milliseconds
    #[arg(long, default_value_t = shared::PROPAGATION_DELAY_MS)]
    propagation_delay_ms: u64,

    /// Interval between countdown updates, in milliseconds
    #[arg(long, default_value_t = shared::COUNTDOWN_TICK_MS)]
    tick_interval_ms: u64,

    /// Number of results kept on the leaderboard
    #[arg(long, default_value_t = shared::LEADERBOARD_SIZE)]
    leaderboard_size: usize,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        GameConfig {
            game_duration: Duration::from_secs(self.game_duration),
            propagation_delay: Duration::from_millis(self.propagation_delay_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            leaderboard_size: self.leaderboard_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.game_config();
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Games last {}s, propagation delay {}ms",
        config.duration_secs(),
        config.propagation_delay.as_millis()
    );

    let mut server = Server::new(
        &address,
        config,
        args.max_clients,
        Duration::from_secs(args.client_timeout),
    )
    .await?;

    let shutdown = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = shutdown.send(ServerMessage::Shutdown) {
                error!("Failed to signal shutdown: {}", e);
            }
        }
    });

    server.run().await?;

    Ok(())
}
