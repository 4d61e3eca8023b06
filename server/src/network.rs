//! Server network layer: UDP transport feeding the game dispatcher

use crate::client_manager::ClientManager;
use crate::config::GameConfig;
use crate::dispatcher::{ClientEvent, Dispatcher, TimerEvent};
use crate::leaderboard::Leaderboard;
use crate::session::Outbound;
use crate::ConnectionId;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ConnectionId },
    Shutdown,
}

/// UDP front end owning the game dispatcher
///
/// Every inbound packet, client timeout and timer firing is funneled into
/// one loop in `run`, so the engine sees a single ordered stream of events.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    dispatcher: Dispatcher,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbox_rx: mpsc::UnboundedReceiver<Outbound>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: GameConfig,
        max_clients: usize,
        client_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let leaderboard = Arc::new(Leaderboard::new(config.leaderboard_size));
        let dispatcher = Dispatcher::new(config, leaderboard, outbox_tx, timer_tx);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            dispatcher,
            client_timeout,
            server_tx,
            server_rx,
            outbox_rx,
            timer_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping `run` from another task
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn leaderboard(&self) -> Arc<Leaderboard> {
        Arc::clone(self.dispatcher.leaderboard())
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that delivers engine notifications to client addresses
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut outbox_rx = std::mem::replace(&mut self.outbox_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(Outbound { to, packet }) = outbox_rx.recv().await {
                let addr = {
                    let clients_guard = clients.read().await;
                    clients_guard.addr_of(to)
                };

                match addr {
                    Some(addr) => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send to client {}: {}", to, e);
                        }
                    }
                    None => debug!("Dropping packet for departed client {}", to),
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Replies to an address that may not have a client id yet
    async fn reply(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = Self::send_packet_impl(&self.socket, &packet, addr).await {
            error!("Failed to reply to {}: {}", addr, e);
        }
    }

    /// Processes one datagram from a client
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if !packet.is_client_packet() {
            warn!("Dropping server-only packet from {}", addr);
            return;
        }

        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let id = clients.find_client_by_addr(addr);
            if let Some(id) = id {
                clients.touch(id);
            }
            id
        };
        let Some(client_id) = client_id else {
            warn!("Packet from unknown address {}, ignoring", addr);
            return;
        };

        match packet {
            Packet::Heartbeat => {}
            Packet::Disconnect => {
                self.clients.write().await.remove_client(&client_id);
                self.dispatcher.connection_closed(client_id);
            }
            other => match ClientEvent::from_packet(other) {
                Some(event) => self.dispatcher.handle_event(client_id, event),
                None => warn!("Unexpected packet type from client {}", client_id),
            },
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!("Rejecting {}: protocol version {}", addr, client_version);
            let response = Packet::Disconnected {
                reason: "Protocol version mismatch".to_string(),
            };
            self.reply(response, addr).await;
            return;
        }

        // A reconnect from the same address replaces the old connection
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.clients.write().await.remove_client(&existing_id);
            self.dispatcher.connection_closed(existing_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        let response = match client_id {
            Some(client_id) => Packet::Connected { client_id },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.reply(response, addr).await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.dispatcher.connection_closed(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                Some(event) = self.timer_rx.recv() => {
                    self.dispatcher.handle_timer(event);
                },
            }
        }

        self.dispatcher.shutdown();
        Ok(())
    }
}
