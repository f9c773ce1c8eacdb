//! Client registry implementation
//!
//! The control channel inserts clients while the publish scheduler iterates
//! and removes them. Both go through one `tokio::sync::Mutex`, and the
//! statistics live under the same lock so connection counters touched by
//! both tasks stay consistent.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

use super::client::{Client, ClientId};
use crate::error::ControlError;
use crate::stats::ServerStats;

/// State guarded by the registry lock
#[derive(Debug, Default)]
pub struct RegistryState {
    clients: Vec<Client>,
    pub stats: ServerStats,
}

impl RegistryState {
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn clients_mut(&mut self) -> &mut [Client] {
        &mut self.clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Remove a client and release its connection slot.
    ///
    /// Callers scanning the list collect ids first and remove after the scan.
    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.id() == id)?;
        let client = self.clients.remove(index);
        self.stats.on_disconnect();

        tracing::info!(
            client = id,
            peer = %client.peer_addr(),
            published = client.published,
            connected_secs = client.connected_for().as_secs(),
            clients = self.clients.len(),
            "Client removed"
        );
        Some(client)
    }
}

/// Registry of subscribed clients
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
    /// Slots promised to subscribers still being answered
    reserved: AtomicUsize,
    /// 0 means no limit
    max_clients: usize,
}

impl ClientRegistry {
    /// Create a registry without a client limit
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    pub fn with_limit(max_clients: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
            reserved: AtomicUsize::new(0),
            max_clients,
        }
    }

    /// Lock the registry for iteration or bulk updates
    pub async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Add a client subscribed to `types`.
    ///
    /// `types` is copied; the request buffer it came from is transient.
    pub async fn register(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        types: &[i32],
    ) -> Result<ClientId, ControlError> {
        let slot = self.reserve().await?;
        Ok(slot.commit(stream, peer_addr, types).await)
    }

    /// Hold a client slot until [`SlotReservation::commit`] or drop.
    ///
    /// The limit check counts outstanding reservations, so a subscriber that
    /// gets an ACK is never refused afterwards.
    pub async fn reserve(&self) -> Result<SlotReservation<'_>, ControlError> {
        let state = self.state.lock().await;
        if self.max_clients > 0
            && state.clients.len() + self.reserved.load(Ordering::Acquire) >= self.max_clients
        {
            return Err(ControlError::RegistryFull(self.max_clients));
        }
        self.reserved.fetch_add(1, Ordering::AcqRel);

        Ok(SlotReservation {
            registry: self,
            held: true,
        })
    }

    /// Remove a client by id
    pub async fn unregister(&self, id: ClientId) -> bool {
        self.state.lock().await.unregister(id).is_some()
    }

    /// Whether a new client would be refused
    pub async fn is_full(&self) -> bool {
        if self.max_clients == 0 {
            return false;
        }
        let state = self.state.lock().await;
        state.clients.len() + self.reserved.load(Ordering::Acquire) >= self.max_clients
    }

    pub async fn client_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    /// Count an accepted connection
    pub async fn on_connect(&self) {
        self.state.lock().await.stats.on_connect();
    }

    /// Count a connection closed without becoming a client
    pub async fn on_disconnect(&self) {
        self.state.lock().await.stats.on_disconnect();
    }

    pub async fn stats_snapshot(&self) -> ServerStats {
        self.state.lock().await.stats.clone()
    }

    /// Drop every client, returning how many were removed
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let clients = std::mem::take(&mut state.clients);
        let count = clients.len();

        for mut client in clients {
            client.shutdown().await;
            state.stats.on_disconnect();
        }

        if count > 0 {
            tracing::debug!(clients = count, "Registry cleared");
        }
        count
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A client slot held while the subscribe ACK is written
pub struct SlotReservation<'a> {
    registry: &'a ClientRegistry,
    held: bool,
}

impl SlotReservation<'_> {
    /// Turn the reserved slot into a registered client
    pub async fn commit(
        mut self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        types: &[i32],
    ) -> ClientId {
        let registry = self.registry;
        let mut state = registry.state.lock().await;
        self.release();

        let id = registry.next_id.fetch_add(1, Ordering::Relaxed);
        state.clients.push(Client::new(id, stream, peer_addr, types));

        tracing::info!(
            client = id,
            peer = %peer_addr,
            subscriptions = ?types,
            clients = state.clients.len(),
            "Client subscribed"
        );
        id
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.held) {
            self.registry.reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
