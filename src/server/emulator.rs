//! 7K Center emulator
//!
//! Binds the control port and runs the control channel and the publish
//! scheduler side by side until shutdown, a STOP request, or the end of
//! the file list.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::context::ServerContext;
use crate::server::listener::ControlChannel;
use crate::server::publisher::PublishScheduler;

/// 7K Center emulation server
pub struct Emu7kServer {
    ctx: Arc<ServerContext>,
}

impl Emu7kServer {
    /// Create a server, rejecting an unusable configuration
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(ServerContext::new(config)),
        })
    }

    /// Shared state, for inspecting clients and statistics
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config().bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until a client sends STOP or the file list ends.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        self.run_on(listener, shutdown).await
    }

    /// Run on an already bound listener
    pub async fn run_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "7K Center emulator listening");

        let control = tokio::spawn(ControlChannel::new(Arc::clone(&self.ctx), listener).run());
        let mut scheduler = tokio::spawn(PublishScheduler::new(Arc::clone(&self.ctx)).run());
        let mut scheduler_done = false;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.ctx.stopped() => {
                tracing::info!("Stop requested");
            }
            joined = &mut scheduler => {
                scheduler_done = true;
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Publish scheduler failed");
                }
                tracing::info!("Replay finished");
            }
        }

        self.ctx.request_stop();

        if !scheduler_done {
            if let Err(e) = scheduler.await {
                tracing::error!(error = %e, "Publish scheduler failed");
            }
        }
        if let Err(e) = control.await {
            tracing::error!(error = %e, "Control channel failed");
        }

        let released = self.ctx.registry().clear().await;
        tracing::debug!(clients = released, "Released clients");

        self.ctx
            .registry()
            .stats_snapshot()
            .await
            .log("Final statistics");
        Ok(())
    }
}
