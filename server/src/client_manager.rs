//! Connection table for the UDP transport
//!
//! UDP has no notion of a connection, so this module provides one:
//! - Client ids handed out on `Connect` and mapped to socket addresses
//! - Activity tracking from every received packet
//! - Timeout detection, turning silent clients into disconnects
//! - Capacity enforcement
//!
//! The game engine only ever sees the ids; addresses stay here.

use crate::ConnectionId;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// A connected client as seen by the transport
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing arrived from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Client ids start at 1 and are never reused within a process, so a late
/// packet addressed to a departed client can never reach a newcomer.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ConnectionId, Client>,
    /// Next available client ID for new connections
    next_client_id: ConnectionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client, returning false if it was already gone
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: ConnectionId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Marks the client as alive
    pub fn touch(&mut self, client_id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Removes clients silent for longer than `timeout` and returns their ids
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn test_add_and_find_client() {
        let mut manager = ClientManager::new(4);
        let id = manager.add_client(addr(9000)).unwrap();

        assert_eq!(id, 1);
        assert_eq!(manager.find_client_by_addr(addr(9000)), Some(1));
        assert_eq!(manager.addr_of(1), Some(addr(9000)));
        assert_eq!(manager.find_client_by_addr(addr(9001)), None);
    }

    #[test]
    fn test_capacity_limit() {
        let mut manager = ClientManager::new(2);
        assert!(manager.add_client(addr(1)).is_some());
        assert!(manager.add_client(addr(2)).is_some());
        assert!(manager.add_client(addr(3)).is_none());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(4);
        let first = manager.add_client(addr(1)).unwrap();
        assert!(manager.remove_client(&first));
        assert!(!manager.remove_client(&first));

        let second = manager.add_client(addr(1)).unwrap();
        assert_ne!(first, second);
        assert!(manager.addr_of(first).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_and_touch() {
        let mut manager = ClientManager::new(4);
        let quiet = manager.add_client(addr(1)).unwrap();
        let chatty = manager.add_client(addr(2)).unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        manager.touch(chatty);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let timed_out = manager.check_timeouts(Duration::from_secs(5));
        assert_eq!(timed_out, vec![quiet]);
        assert_eq!(manager.len(), 1);
        assert!(manager.addr_of(chatty).is_some());
        assert!(!manager.is_empty());
    }
}
