//! # CSMA/CD Game Server Library
//!
//! This library provides the authoritative server for a two-player game that
//! simulates Carrier Sense Multiple Access with Collision Detection. Both
//! players share one virtual channel: a packet sent while the opponent still
//! has a packet propagating across the medium collides and is lost. The team
//! score is the harmonic mean of both players' successful packets, so it
//! rewards fair sharing of the channel over raw throughput.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! Players who ask to join wait in a FIFO queue and are paired two at a time
//! as soon as an opponent is available.
//!
//! ### Channel Contention
//! Each pair plays in a session that tracks per-player sent, successful and
//! in-flight packet counters, decides success or collision for every
//! transmission, and notifies the opponent when the channel clears after the
//! propagation delay.
//!
//! ### Session Lifecycle
//! Sessions count down once per tick, finalize into the leaderboard when the
//! game duration elapses, and are torn down without a result when either
//! player disconnects.
//!
//! ## Architecture Design
//!
//! ### Single Event Stream
//! Inbound packets, client timeouts and timer firings all flow through one
//! loop that owns the [`dispatcher::Dispatcher`]. Nothing in the engine is
//! mutated concurrently, and transmissions are applied strictly in arrival
//! order, which is what decides collisions.
//!
//! ### Timers As Messages
//! Propagation, countdown and end-of-game timers are tokio tasks that sleep
//! and then post a [`dispatcher::TimerEvent`] into the event loop. They are
//! registered per session and aborted when the session goes away; a firing
//! that still slips through finds no session and is ignored.
//!
//! ### UDP Transport
//! The engine addresses clients by [`ConnectionId`] only. The
//! [`network::Server`] maps ids to socket addresses, performs the connect
//! handshake and turns heartbeat timeouts into disconnects.
//!
//! ## Module Organization
//!
//! - `config`: tunable durations and leaderboard size
//! - `matchmaking`: the waiting queue
//! - `session`: the contention state machine and scoring
//! - `registry`: live sessions and their timer tasks
//! - `leaderboard`: the shared, bounded list of results
//! - `dispatcher`: event routing between transport and engine
//! - `client_manager`: the connection table behind the transport
//! - `network`: UDP socket handling and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         GameConfig::default(),
//!         32,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod leaderboard;
pub mod matchmaking;
pub mod network;
pub mod registry;
pub mod session;
pub mod utils;

/// Identifier of one client connection, assigned by the transport
pub type ConnectionId = u32;
