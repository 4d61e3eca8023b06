use crate::game::ClientGameState;
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, Instant};

/// Default number of send slots a bot may stay quiet after a collision
pub const DEFAULT_MAX_BACKOFF: u32 = 4;

/// Headless player that joins one game and transmits with carrier sensing
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    connected: bool,

    state: ClientGameState,
    rng: StdRng,

    send_interval: Duration,
    max_sends: Option<u32>,
    sends: u32,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        name: &str,
        send_interval: Duration,
        max_sends: Option<u32>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            name: name.to_string(),
            connected: false,
            state: ClientGameState::new(DEFAULT_MAX_BACKOFF),
            rng: StdRng::from_entropy(),
            send_interval,
            max_sends,
            sends: 0,
        })
    }

    pub fn state(&self) -> &ClientGameState {
        &self.state
    }

    pub fn sends(&self) -> u32 {
        self.sends
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Delay until the next send slot, jittered by up to half an interval
    fn next_slot(&mut self) -> Duration {
        let base = self.send_interval.as_millis() as u64;
        let jitter = self.rng.gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        match &packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.connected = true;
                self.send_packet(&Packet::Join {
                    name: self.name.clone(),
                })
                .await?;
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
            }
            Packet::OpponentDisconnected => {
                warn!("Opponent left the game");
            }
            _ => {}
        }

        self.state.apply_packet(&packet, &mut self.rng);
        Ok(())
    }

    async fn transmit(&mut self) {
        if self.max_sends.is_some_and(|max| self.sends >= max) {
            return;
        }
        if !self.state.should_transmit() {
            return;
        }

        match self.send_packet(&Packet::Transmit).await {
            Ok(()) => self.sends += 1,
            Err(e) => error!("Error sending packet: {}", e),
        }
    }

    /// Plays until the game ends or the server drops the connection
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server as {}...", self.name);
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await?;

        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let send_timer = sleep(self.send_interval);
        tokio::pin!(send_timer);

        let mut buffer = [0u8; 2048];

        while !self.state.is_finished() {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet).await?;
                            } else {
                                warn!("Failed to deserialize packet from server");
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },

                _ = &mut send_timer => {
                    self.transmit().await;
                    let next = self.next_slot();
                    send_timer.as_mut().reset(Instant::now() + next);
                },
            }
        }

        info!(
            "{} finished: delivered {}/{} packets, {} collisions",
            self.name, self.state.your_packets, self.state.total_sent, self.state.collisions
        );

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
