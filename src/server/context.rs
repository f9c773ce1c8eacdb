//! Shared server context
//!
//! Built once at startup and handed to the control channel and the publish
//! scheduler. Holds the configuration, the client registry, the stop flag
//! and the transaction id counter.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::registry::ClientRegistry;
use crate::server::config::ServerConfig;

/// State shared by the server tasks
pub struct ServerContext {
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    stop: watch::Sender<bool>,
    tx_id: AtomicU16,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ClientRegistry::with_limit(config.max_clients));
        let (stop, _) = watch::channel(false);

        Self {
            config,
            registry,
            stop,
            tx_id: AtomicU16::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Ask every task to wind down
    pub fn request_stop(&self) {
        if !self.stop.send_replace(true) {
            tracing::debug!("Stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        let mut rx = self.stop.subscribe();
        // The sender lives in self, so the channel cannot close under us
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Allocate a transaction id for an outbound network frame
    pub fn next_tx_id(&self) -> u16 {
        self.tx_id.fetch_add(1, Ordering::Relaxed)
    }
}
