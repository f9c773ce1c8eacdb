//! Publish scheduler
//!
//! Replays the file list: for each frame, fan out to subscribed clients,
//! wait the paced gap to the next frame, then advance. Nothing is read
//! while no client is connected.
//!
//! ```text
//!   next_file ─► open ─► seed ─┬─► idle? ──yes──► sleep ─┐
//!                              │     │no                 │
//!                              │     ▼                   │
//!                              │  fan out ─► pace ─► advance
//!                              │                         │
//!                              └────────── Ready ◄───────┘
//!                                 EndOfStream ─► next_file / cycle
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;

use crate::error::FrameError;
use crate::protocol::{encode, Frame, InputMode};
use crate::registry::{is_disconnect, ClientId};
use crate::server::context::ServerContext;
use crate::server::pacing::PacingPolicy;
use crate::source::{Advance, FrameCache, Playlist, PlaylistEntry, SourceFile};

/// Outcome of replaying one file
#[derive(Debug, Default, Clone, Copy)]
struct FileReport {
    /// Frames read
    frames: u64,
    /// File was skipped to honor the start offset
    skipped: bool,
}

/// Replay loop over the configured source files
pub struct PublishScheduler {
    ctx: Arc<ServerContext>,
    playlist: Playlist,
    cache: FrameCache,
    pacing: PacingPolicy,
    /// Start offset still to be consumed on the first pass
    start_offset: u64,
    last_fault: Instant,
}

impl PublishScheduler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        let config = ctx.config();
        let files = config
            .sources
            .iter()
            .map(|path| SourceFile::new(path.clone()))
            .collect();

        Self {
            playlist: Playlist::new(files, config.restart),
            cache: FrameCache::new(config.max_frame_bytes, config.input_mode),
            pacing: PacingPolicy::new(config.min_delay, config.max_delay),
            start_offset: config.start_offset,
            last_fault: Instant::now(),
            ctx,
        }
    }

    /// Replay until stopped or the file list is exhausted
    pub async fn run(mut self) {
        tracing::info!(
            files = self.playlist.len(),
            restart = self.ctx.config().restart,
            min_delay_ms = self.pacing.min.as_millis() as u64,
            max_delay_ms = self.pacing.max.as_millis() as u64,
            "Publish scheduler started"
        );

        let mut pass_frames = 0u64;
        let mut pass_files = 0usize;
        let mut pass_skipped = 0usize;

        while !self.ctx.is_stopped() {
            let Some(entry) = self.playlist.next_file() else {
                tracing::info!("End of file list");
                break;
            };

            let report = self.replay_file(&entry).await;
            pass_frames += report.frames;
            pass_files += 1;
            if report.skipped {
                pass_skipped += 1;
            }

            if self.ctx.is_stopped() {
                break;
            }

            if entry.is_last {
                // The start offset only applies to the first pass
                if self.start_offset > 0 {
                    tracing::warn!(
                        remaining = self.start_offset,
                        "Start offset beyond end of file list, ignoring remainder"
                    );
                    self.start_offset = 0;
                }

                if pass_skipped == pass_files {
                    tracing::debug!("Whole pass skipped by start offset");
                    pass_frames = 0;
                    pass_files = 0;
                    pass_skipped = 0;
                    continue;
                }

                {
                    let mut state = self.ctx.registry().lock().await;
                    state.stats.complete_cycle();
                    tracing::info!(
                        cycles = state.stats.cyc_total,
                        frames = pass_frames,
                        "Cycle complete"
                    );
                }

                if pass_frames == 0 && pass_skipped == 0 {
                    tracing::warn!("No frames read in a full pass over the file list, stopping");
                    break;
                }
                if self.ctx.config().restart {
                    tracing::debug!("Restarting at beginning of file list");
                }
                pass_frames = 0;
                pass_files = 0;
                pass_skipped = 0;
            }
        }

        tracing::debug!("Publish scheduler stopped");
    }

    async fn replay_file(&mut self, entry: &PlaylistEntry) -> FileReport {
        let path = entry.file.path().display().to_string();

        let (mut reader, len) = match entry.file.open_at(self.start_offset).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(file = %path, error = %e, "Failed to open source, skipping");
                return FileReport::default();
            }
        };

        if self.start_offset > 0 {
            if self.start_offset >= len {
                tracing::debug!(
                    file = %path,
                    offset = self.start_offset,
                    len = len,
                    "Start offset beyond end of file, skipping"
                );
                self.start_offset -= len;
                return FileReport {
                    frames: 0,
                    skipped: true,
                };
            }
            tracing::info!(file = %path, offset = self.start_offset, "Starting at offset");
            self.start_offset = 0;
        }

        tracing::info!(file = %path, index = entry.index, len = len, "Replaying source");

        if let Err(e) = self.cache.seed(&mut reader).await {
            match e {
                FrameError::EndOfStream => tracing::debug!(file = %path, "Empty source"),
                e => {
                    tracing::warn!(file = %path, error = %e, "Unusable source, skipping");
                    self.count_frame_error(&e).await;
                }
            }
            return FileReport::default();
        }

        let mut report = FileReport {
            frames: 1,
            skipped: false,
        };
        self.count_read().await;

        loop {
            if self.ctx.is_stopped() {
                return report;
            }

            if self.ctx.registry().client_count().await == 0 {
                tokio::select! {
                    _ = self.ctx.stopped() => return report,
                    _ = tokio::time::sleep(self.ctx.config().idle_interval) => continue,
                }
            }

            let Some(frame) = self.cache.current().cloned() else {
                return report;
            };
            self.publish(&frame).await;

            let delay = self.pacing.delay(self.cache.delta());
            if !delay.is_zero() {
                tokio::select! {
                    _ = self.ctx.stopped() => return report,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            self.fault_pause().await;

            match self.cache.advance(&mut reader).await {
                Advance::Ready => {
                    report.frames += 1;
                    self.count_read().await;
                }
                Advance::EndOfStream => {
                    if let Some(e) = self.cache.take_error() {
                        tracing::warn!(file = %path, error = %e, "Read error, ending source");
                        self.count_frame_error(&e).await;
                    }
                    tracing::debug!(file = %path, frames = report.frames, "End of source");
                    return report;
                }
            }
        }
    }

    /// Send one frame to every subscribed client, dropping dead peers
    async fn publish(&self, frame: &Frame) {
        let config = self.ctx.config();
        let record_type = frame.record_type();
        let mut state = self.ctx.registry().lock().await;

        let mut dead: Vec<ClientId> = Vec::new();
        let mut sent = 0u64;

        for client in state.clients_mut() {
            if !client.is_subscribed(record_type) {
                tracing::trace!(client = client.id(), record_type, "Not subscribed");
                continue;
            }

            let wire: Bytes = match config.input_mode {
                InputMode::RawDrf => encode(
                    frame.as_bytes(),
                    self.ctx.next_tx_id(),
                    client.next_seq(),
                ),
                InputMode::NetworkFramed => frame.as_bytes().clone(),
            };

            match client.send(&wire, config.send_timeout).await {
                Ok(()) => {
                    sent += 1;
                    tracing::trace!(
                        client = client.id(),
                        record_type,
                        len = wire.len(),
                        "Frame sent"
                    );
                }
                Err(e) if is_disconnect(&e) => {
                    tracing::info!(
                        client = client.id(),
                        peer = %client.peer_addr(),
                        error = %e,
                        "Connection broken"
                    );
                    dead.push(client.id());
                }
                Err(e) => {
                    tracing::warn!(client = client.id(), error = %e, "Send failed");
                }
            }
        }

        state.stats.on_publish(sent);
        for id in dead {
            if state.unregister(id).is_some() {
                state.stats.disconnects += 1;
            }
        }
    }

    async fn count_read(&self) {
        let interval = self.ctx.config().stats_interval;
        let mut state = self.ctx.registry().lock().await;
        state.stats.on_read();

        if interval > 0 && state.stats.rec_total % interval == 0 {
            state.stats.log("Replay statistics");
        }
    }

    async fn count_frame_error(&self, e: &FrameError) {
        if matches!(e, FrameError::Invalid(_)) {
            self.ctx.registry().lock().await.stats.frame_err += 1;
        }
    }

    /// Hold publishing for the configured pause once per interval
    async fn fault_pause(&mut self) {
        let Some(fault) = self.ctx.config().fault else {
            return;
        };
        if fault.pause.is_zero() || self.last_fault.elapsed() < fault.interval {
            return;
        }

        tracing::info!(
            interval_secs = fault.interval.as_secs(),
            pause_secs = fault.pause.as_secs(),
            "Injected publishing pause"
        );
        tokio::select! {
            _ = self.ctx.stopped() => {}
            _ = tokio::time::sleep(fault.pause) => {}
        }
        self.last_fault = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use tempfile::NamedTempFile;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::protocol::constants::NF_BYTES;
    use crate::protocol::{DataRecordFrame, NetworkFrame, SevenKTime};
    use crate::server::config::{FaultInjection, ServerConfig};

    fn drf(record_type: u32, t: f64) -> Bytes {
        let time = SevenKTime::from_unix_seconds(t).unwrap();
        DataRecordFrame::new(record_type, time, 12).build(&[record_type as u8; 12])
    }

    fn source(frames: &[Bytes]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for frame in frames {
            file.write_all(frame).unwrap();
        }
        file.flush().unwrap();
        file
    }

    /// Register a client on `ctx` and return the remote end
    async fn subscriber(ctx: &ServerContext, types: &[i32]) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (remote, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (stream, peer) = accepted.unwrap();
        ctx.registry().on_connect().await;
        ctx.registry().register(stream, peer, types).await.unwrap();
        remote.unwrap()
    }

    async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut nf = vec![0u8; NF_BYTES];
        stream.read_exact(&mut nf).await.unwrap();
        let header = NetworkFrame::parse(&nf).unwrap();
        let mut drf = vec![0u8; header.total_size as usize];
        stream.read_exact(&mut drf).await.unwrap();
        nf.extend_from_slice(&drf);
        nf
    }

    #[tokio::test]
    async fn test_replays_subscribed_types() {
        let t0 = 1_600_000_000.0;
        let frames = [drf(7, t0), drf(10, t0 + 0.01), drf(7, t0 + 0.02)];
        let file = source(&frames);

        let config = ServerConfig::default()
            .source(file.path())
            .restart(false)
            .max_delay(Duration::from_millis(10));
        let ctx = Arc::new(ServerContext::new(config));
        let mut remote = subscriber(&ctx, &[7]).await;

        PublishScheduler::new(Arc::clone(&ctx)).run().await;

        let first = read_frame(&mut remote).await;
        let second = read_frame(&mut remote).await;
        assert_eq!(&first[NF_BYTES..], &frames[0][..]);
        assert_eq!(&second[NF_BYTES..], &frames[2][..]);

        let nf1 = NetworkFrame::parse(&first).unwrap();
        let nf2 = NetworkFrame::parse(&second).unwrap();
        assert_eq!(nf1.seq_number, 0);
        assert_eq!(nf2.seq_number, 1);
        assert_ne!(nf1.tx_id, nf2.tx_id);

        let stats = ctx.registry().stats_snapshot().await;
        assert_eq!(stats.rec_total, 3);
        assert_eq!(stats.pub_total, 2);
        assert_eq!(stats.cyc_total, 1);
    }

    #[tokio::test]
    async fn test_network_framed_passthrough() {
        let t0 = 1_600_000_000.0;
        let recorded = encode(&drf(1012, t0), 777, 55);
        let file = source(&[recorded.clone()]);

        let config = ServerConfig::default()
            .source(file.path())
            .restart(false)
            .input_mode(InputMode::NetworkFramed);
        let ctx = Arc::new(ServerContext::new(config));
        let mut remote = subscriber(&ctx, &[1012]).await;

        PublishScheduler::new(Arc::clone(&ctx)).run().await;

        assert_eq!(read_frame(&mut remote).await, recorded.to_vec());
    }

    #[tokio::test]
    async fn test_start_offset_skips_files() {
        let t0 = 1_600_000_000.0;
        let a = source(&[drf(1, t0)]);
        let b = source(&[drf(2, t0), drf(3, t0)]);
        let skip = a.as_file().metadata().unwrap().len() + drf(2, t0).len() as u64;

        let config = ServerConfig::default()
            .sources([a.path(), b.path()])
            .restart(false)
            .start_offset(skip);
        let ctx = Arc::new(ServerContext::new(config));
        let mut remote = subscriber(&ctx, &[1, 2, 3]).await;

        PublishScheduler::new(Arc::clone(&ctx)).run().await;

        let only = read_frame(&mut remote).await;
        let header = DataRecordFrame::parse(&only[NF_BYTES..]).unwrap();
        assert_eq!(header.record_type_id, 3);
        assert_eq!(ctx.registry().stats_snapshot().await.rec_total, 1);
    }

    #[tokio::test]
    async fn test_start_offset_past_list_applies_once() {
        let t0 = 1_600_000_000.0;
        let file = source(&[drf(4, t0)]);
        let len = file.as_file().metadata().unwrap().len();

        let config = ServerConfig::default()
            .source(file.path())
            .restart(true)
            .min_delay(Duration::from_millis(50))
            .start_offset(len * 50);
        let ctx = Arc::new(ServerContext::new(config));
        let mut remote = subscriber(&ctx, &[4]).await;

        let handle = tokio::spawn(PublishScheduler::new(Arc::clone(&ctx)).run());

        // The second pass starts from the beginning of the file
        let first = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut remote))
            .await
            .unwrap();
        assert_eq!(&first[NF_BYTES..], &drf(4, t0)[..]);
        assert_eq!(NetworkFrame::parse(&first).unwrap().seq_number, 0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        ctx.request_stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Passes swallowed by the offset are not cycles
        let stats = ctx.registry().stats_snapshot().await;
        assert!(stats.rec_total >= 1);
        assert!(
            stats.cyc_total <= stats.rec_total,
            "cycles {} records {}",
            stats.cyc_total,
            stats.rec_total
        );
    }

    #[tokio::test]
    async fn test_fault_injection_pauses_publishing() {
        let t0 = 1_600_000_000.0;
        let frames: Vec<Bytes> = (0..6).map(|i| drf(9, t0 + i as f64 * 0.05)).collect();
        let file = source(&frames);

        let config = ServerConfig::default()
            .source(file.path())
            .restart(false)
            .fault_injection(FaultInjection {
                interval: Duration::from_millis(150),
                pause: Duration::from_millis(400),
            });
        let ctx = Arc::new(ServerContext::new(config));
        let mut remote = subscriber(&ctx, &[9]).await;

        let handle = tokio::spawn(PublishScheduler::new(Arc::clone(&ctx)).run());

        let mut arrivals = Vec::new();
        for _ in 0..frames.len() {
            tokio::time::timeout(Duration::from_secs(3), read_frame(&mut remote))
                .await
                .unwrap();
            arrivals.push(std::time::Instant::now());
        }
        handle.await.unwrap();

        let longest = arrivals
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs_f64())
            .fold(0.0, f64::max);
        assert!(longest >= 0.35, "longest gap {longest}");

        // The pause does not cost the client its subscription
        assert_eq!(ctx.registry().client_count().await, 1);
        let stats = ctx.registry().stats_snapshot().await;
        assert_eq!(stats.pub_total, frames.len() as u64);
        assert_eq!(stats.disconnects, 0);
    }

    #[tokio::test]
    async fn test_stop_during_fault_pause() {
        let t0 = 1_600_000_000.0;
        let file = source(&[drf(9, t0), drf(9, t0 + 0.01), drf(9, t0 + 0.02)]);

        let config = ServerConfig::default()
            .source(file.path())
            .restart(false)
            .fault_injection(FaultInjection {
                interval: Duration::from_millis(10),
                pause: Duration::from_secs(30),
            });
        let ctx = Arc::new(ServerContext::new(config));
        let mut remote = subscriber(&ctx, &[9]).await;

        let handle = tokio::spawn(PublishScheduler::new(Arc::clone(&ctx)).run());
        read_frame(&mut remote).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.request_stop();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.registry().stats_snapshot().await.pub_total, 1);
    }

    #[tokio::test]
    async fn test_empty_pass_stops_with_restart() {
        let empty = source(&[]);
        let config = ServerConfig::default().source(empty.path()).restart(true);
        let ctx = Arc::new(ServerContext::new(config));

        tokio::time::timeout(
            Duration::from_secs(2),
            PublishScheduler::new(Arc::clone(&ctx)).run(),
        )
        .await
        .unwrap();

        assert_eq!(ctx.registry().stats_snapshot().await.cyc_total, 1);
    }

    #[tokio::test]
    async fn test_corrupt_source_counts_error() {
        let mut bad = drf(1, 1_600_000_000.0).to_vec();
        bad[4] = 0;
        let file = source(&[Bytes::from(bad)]);

        let config = ServerConfig::default().source(file.path()).restart(false);
        let ctx = Arc::new(ServerContext::new(config));
        PublishScheduler::new(Arc::clone(&ctx)).run().await;

        let stats = ctx.registry().stats_snapshot().await;
        assert_eq!(stats.frame_err, 1);
        assert_eq!(stats.rec_total, 0);
    }

    #[tokio::test]
    async fn test_stop_while_idle() {
        let file = source(&[drf(1, 1_600_000_000.0)]);
        let config = ServerConfig::default().source(file.path());
        let ctx = Arc::new(ServerContext::new(config));

        let handle = tokio::spawn(PublishScheduler::new(Arc::clone(&ctx)).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.request_stop();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.registry().stats_snapshot().await.pub_total, 0);
    }
}
