//! Subscribed client

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Client identifier, unique for the life of the server
pub type ClientId = u64;

/// One connected subscriber
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    peer_addr: SocketAddr,
    /// Owned copy of the requested record types
    subscriptions: Vec<i32>,
    stream: TcpStream,
    /// Sequence number for the next re-wrapped frame
    seq: u32,
    connected_at: Instant,
    /// Frames sent
    pub published: u64,
    pub bytes_sent: u64,
}

impl Client {
    pub fn new(id: ClientId, stream: TcpStream, peer_addr: SocketAddr, types: &[i32]) -> Self {
        Self {
            id,
            peer_addr,
            subscriptions: types.to_vec(),
            stream,
            seq: 0,
            connected_at: Instant::now(),
            published: 0,
            bytes_sent: 0,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn subscriptions(&self) -> &[i32] {
        &self.subscriptions
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether this client asked for `record_type`.
    ///
    /// Subscription lists are short, so this is a plain scan.
    pub fn is_subscribed(&self, record_type: u32) -> bool {
        self.subscriptions
            .iter()
            .any(|&t| t as u32 == record_type)
    }

    /// Take the next per-client sequence number
    pub fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Write one frame, failing with `TimedOut` if it does not complete in `limit`
    pub async fn send(&mut self, data: &[u8], limit: Duration) -> io::Result<()> {
        match tokio::time::timeout(limit, self.stream.write_all(data)).await {
            Ok(Ok(())) => {
                self.published += 1;
                self.bytes_sent += data.len() as u64;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "send timed out")),
        }
    }

    /// Flush and close the write half
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Whether a send error means the peer is gone
pub fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WriteZero
    )
}
