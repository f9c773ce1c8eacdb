//! Control channel listener
//!
//! Accepts connections and serves one control request on each. Requests are
//! read concurrently from a `JoinSet`, so a slow client never holds up the
//! accept loop. A subscribe turns the connection into a registered client;
//! every other request closes it.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::error::ControlError;
use crate::protocol::constants::NF_BYTES;
use crate::protocol::message::{self, ControlRequest, ACK_REPLY};
use crate::server::context::ServerContext;

/// Accept loop for control connections
pub struct ControlChannel {
    ctx: Arc<ServerContext>,
    listener: TcpListener,
}

impl ControlChannel {
    pub fn new(ctx: Arc<ServerContext>, listener: TcpListener) -> Self {
        Self { ctx, listener }
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until a stop is requested
    pub async fn run(self) {
        let mut pending = JoinSet::new();
        let poll_interval = self.ctx.config().poll_interval;

        while !self.ctx.is_stopped() {
            tokio::select! {
                _ = self.ctx.stopped() => break,
                accepted = tokio::time::timeout(poll_interval, self.listener.accept()) => {
                    match accepted {
                        // Bounded wait elapsed; recheck the stop flag
                        Err(_) => {}
                        Ok(Ok((socket, peer_addr))) => {
                            self.handle_connection(&mut pending, socket, peer_addr).await;
                        }
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            tokio::select! {
                                _ = self.ctx.stopped() => break,
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                        }
                    }
                }
                Some(joined) = pending.join_next(), if !pending.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "Request task failed");
                    }
                }
            }
        }

        pending.abort_all();
        while pending.join_next().await.is_some() {}
        tracing::debug!("Control channel stopped");
    }

    async fn handle_connection(
        &self,
        pending: &mut JoinSet<()>,
        socket: TcpStream,
        peer_addr: SocketAddr,
    ) {
        self.ctx.registry().on_connect().await;
        tracing::debug!(peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            self.ctx.registry().on_disconnect().await;
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        pending.spawn(async move {
            if let Err(e) = serve_request(&ctx, socket, peer_addr).await {
                log_rejection(peer_addr, &e);
                ctx.registry().on_disconnect().await;
            }
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.ctx.config().tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

fn log_rejection(peer_addr: SocketAddr, e: &ControlError) {
    match e {
        ControlError::Closed => {
            tracing::debug!(peer = %peer_addr, "Connection closed without a request")
        }
        ControlError::RegistryFull(_) => {
            tracing::warn!(peer = %peer_addr, error = %e, "Subscribe refused")
        }
        _ => tracing::warn!(peer = %peer_addr, error = %e, "Request dropped"),
    }
}

/// Read and answer one request.
///
/// On `Ok` the connection's slot has been accounted for, either by closing it
/// or by handing it to the registry. On `Err` the caller releases the slot.
async fn serve_request(
    ctx: &ServerContext,
    mut socket: TcpStream,
    peer_addr: SocketAddr,
) -> Result<(), ControlError> {
    let config = ctx.config();
    let data = tokio::time::timeout(
        config.request_timeout,
        read_request(&mut socket, config.max_request_bytes),
    )
    .await
    .map_err(|_| ControlError::Timeout)??;

    match message::parse(&data)? {
        ControlRequest::Stop => {
            tracing::info!(peer = %peer_addr, "STOP request");
            let _ = socket.write_all(ACK_REPLY).await;
            let _ = socket.shutdown().await;
            ctx.registry().on_disconnect().await;
            ctx.request_stop();
        }
        ControlRequest::Ping => {
            tracing::debug!(peer = %peer_addr, "REQ request");
            socket.write_all(ACK_REPLY).await?;
            let _ = socket.shutdown().await;
            ctx.registry().on_disconnect().await;
        }
        ControlRequest::Subscribe(request) => {
            // Hold the slot from before the ACK until the client is stored
            let slot = ctx.registry().reserve().await?;

            tracing::debug!(
                peer = %peer_addr,
                tx_id = request.tx_id,
                types = request.record_types.len(),
                "Subscribe request"
            );
            socket
                .write_all(&message::subscribe_ack(ctx.next_tx_id()))
                .await?;
            slot.commit(socket, peer_addr, &request.record_types).await;
        }
    }
    Ok(())
}

/// Read exactly one request from `socket`
async fn read_request(socket: &mut TcpStream, max_len: usize) -> Result<BytesMut, ControlError> {
    let mut buf = BytesMut::with_capacity(NF_BYTES);

    loop {
        let needed = message::request_len(&buf, max_len)?;
        if let Some(len) = needed {
            if buf.len() >= len {
                buf.truncate(len);
                return Ok(buf);
            }
        }
        if buf.len() >= max_len {
            return Err(ControlError::Oversized {
                len: buf.len(),
                max: max_len,
            });
        }

        if socket.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Err(ControlError::Closed);
            }
            return Err(ControlError::Undersized {
                len: buf.len(),
                needed: needed.unwrap_or(NF_BYTES),
            });
        }
    }
}
