//! Transport-level client bookkeeping for the UDP server
//!
//! This module maps socket addresses to network ids and tracks liveness:
//! - Network id allocation (ids start at 1 and are never reused in a session)
//! - Address lookup for routing incoming datagrams
//! - Connection health monitoring and timeout detection
//! - Client capacity management
//!
//! Simulation-side state for each connection lives in
//! [`crate::connections::NetworkIdentity`]; this module only knows about the
//! transport.

use log::info;
use shared::NetworkId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a client is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client as seen by the transport
#[derive(Debug)]
pub struct Client {
    /// Network id assigned by the server
    pub id: NetworkId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client with the given id and address, marked as active now
    pub fn new(id: NetworkId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager enforces server capacity limits and resolves which
/// network id an incoming datagram belongs to.
pub struct ClientManager {
    /// Connected clients indexed by their network id
    clients: HashMap<NetworkId, Client>,
    /// Next network id handed out
    next_client_id: NetworkId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Network ids start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(network_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<NetworkId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone.
    pub fn remove_client(&mut self, client_id: &NetworkId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a network id by address
    ///
    /// Returns None if no client is connected from the given address.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<NetworkId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Looks up the address of a client
    pub fn get_addr(&self, client_id: NetworkId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Records activity for a client. Returns false if the id is unknown.
    pub fn touch(&mut self, client_id: NetworkId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed network ids so the simulation can flag the
    /// matching identities as disconnected.
    pub fn check_timeouts(&mut self) -> Vec<NetworkId> {
        let timed_out: Vec<NetworkId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all network ids and their addresses
    pub fn get_client_addrs(&self) -> Vec<(NetworkId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
