use clap::Parser;
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name shown to the opponent and on the leaderboard
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Base delay between transmit attempts in milliseconds
    #[arg(short = 'i', long, default_value = "500")]
    send_interval_ms: u64,

    /// Stop transmitting after this many packets
    #[arg(short = 'm', long)]
    max_sends: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(
        &args.server,
        &args.name,
        Duration::from_millis(args.send_interval_ms),
        args.max_sends,
    )
    .await?;

    client.run().await?;

    let state = client.state();
    info!("Final score: {}", state.score);
    for (rank, entry) in state.leaderboard.iter().enumerate() {
        info!("{:>2}. {} - {}", rank + 1, entry.team, entry.score);
    }

    Ok(())
}
