//! Statistics for the emulator

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Server-wide statistics
///
/// Connection counters are touched by both the control channel and the
/// publish scheduler, so the whole struct lives under the registry lock.
#[derive(Debug, Clone)]
pub struct ServerStats {
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
    /// Monotonic start, for uptime
    pub started: Instant,
    /// Connections ever accepted
    pub con_total: u64,
    /// Connections currently open (pending requests and live clients)
    pub con_active: u64,
    /// Completed passes over the file list
    pub cyc_total: u64,
    /// Frames read
    pub rec_total: u64,
    /// Frames sent, counted once per receiving client
    pub pub_total: u64,
    /// Frames read in the current cycle
    pub rec_cycle: u64,
    /// Frames sent in the current cycle
    pub pub_cycle: u64,
    /// Reads that ended a file on an invalid frame
    pub frame_err: u64,
    /// Clients dropped after a failed send
    pub disconnects: u64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            con_total: 0,
            con_active: 0,
            cyc_total: 0,
            rec_total: 0,
            pub_total: 0,
            rec_cycle: 0,
            pub_cycle: 0,
            frame_err: 0,
            disconnects: 0,
        }
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn on_connect(&mut self) {
        self.con_total += 1;
        self.con_active += 1;
    }

    pub fn on_disconnect(&mut self) {
        self.con_active = self.con_active.saturating_sub(1);
    }

    pub fn on_read(&mut self) {
        self.rec_total += 1;
        self.rec_cycle += 1;
    }

    /// Count `sent` deliveries of one frame
    pub fn on_publish(&mut self, sent: u64) {
        self.pub_total += sent;
        self.pub_cycle += sent;
    }

    /// Close out a pass over the file list
    pub fn complete_cycle(&mut self) {
        self.cyc_total += 1;
        self.rec_cycle = 0;
        self.pub_cycle = 0;
    }

    /// Emit the counters at info level
    pub fn log(&self, context: &str) {
        tracing::info!(
            started = %self.started_at.format("%Y-%m-%dT%H:%M:%SZ"),
            uptime_secs = self.uptime().as_secs(),
            con_total = self.con_total,
            con_active = self.con_active,
            cyc_total = self.cyc_total,
            rec_total = self.rec_total,
            pub_total = self.pub_total,
            rec_cycle = self.rec_cycle,
            pub_cycle = self.pub_cycle,
            frame_err = self.frame_err,
            disconnects = self.disconnects,
            "{}",
            context
        );
    }
}
