//! # CSMA/CD Game Client Library
//!
//! A headless player for the channel-sharing game. It connects to the server
//! over UDP, joins the matchmaking queue and, once paired, transmits packets
//! on a jittered schedule while listening to what the server reports about
//! the shared channel.
//!
//! ## Transmit Policy
//!
//! ### Carrier Sense
//! The server tells each player, one propagation delay after the opponent's
//! successful packet, whether the opponent still has packets on the wire.
//! The bot never transmits while that report says busy.
//!
//! ### Collision Backoff
//! A collision, whether the bot's own packet was lost or its in-flight packet
//! was hit, makes the bot skip a random number of send slots before trying
//! again. Two bots therefore drift apart instead of colliding in lockstep.
//!
//! ## Module Organization
//!
//! - `game`: the client's view of the session and the transmit decision
//! - `network`: socket handling, handshake, heartbeats and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client =
//!         Client::new("127.0.0.1:8080", "Alice", Duration::from_millis(250), None).await?;
//!     client.run().await?;
//!     println!("Final score: {}", client.state().score);
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
