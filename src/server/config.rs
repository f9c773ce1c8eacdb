//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::constants::*;
use crate::protocol::InputMode;

/// Periodic publishing pause, used to test how consumers handle stalls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultInjection {
    /// Wall time between pauses
    pub interval: Duration,
    /// Length of each pause
    pub pause: Duration,
}

impl FromStr for FaultInjection {
    type Err = ConfigError;

    /// Parse `<interval secs>/<pause secs>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::BadValue {
            option: "xdelay",
            value: s.to_string(),
        };

        let (interval, pause) = s.split_once('/').ok_or_else(bad)?;
        let interval: u64 = interval.trim().parse().map_err(|_| bad())?;
        let pause: u64 = pause.trim().parse().map_err(|_| bad())?;

        Ok(Self {
            interval: Duration::from_secs(interval),
            pause: Duration::from_secs(pause),
        })
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Files to replay, in order
    pub sources: Vec<PathBuf>,

    /// Record layout of the source files
    pub input_mode: InputMode,

    /// Minimum wait between frames
    pub min_delay: Duration,

    /// Maximum wait between frames
    pub max_delay: Duration,

    /// Start over at the first file when the list is exhausted
    pub restart: bool,

    /// Log statistics every this many frames read (0 = off)
    pub stats_interval: u64,

    /// Byte offset into the file list where the first pass starts
    pub start_offset: u64,

    /// Optional periodic pause
    pub fault: Option<FaultInjection>,

    /// Largest frame accepted from a source
    pub max_frame_bytes: usize,

    /// Maximum subscribed clients (0 = unlimited)
    pub max_clients: usize,

    /// Sleep between checks while nobody is subscribed
    pub idle_interval: Duration,

    /// Bound on each listener wait, so the stop flag is seen while idle
    pub poll_interval: Duration,

    /// Control requests must arrive within this time
    pub request_timeout: Duration,

    /// A send to a client must complete within this time
    pub send_timeout: Duration,

    /// Largest control request accepted
    pub max_request_bytes: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            sources: Vec::new(),
            input_mode: InputMode::RawDrf,
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(3),
            restart: true,
            stats_interval: 0,
            start_offset: 0,
            fault: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_clients: 16,
            idle_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            max_request_bytes: 4096,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Append a source file
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Replace the source list
    pub fn sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    pub fn stats_interval(mut self, records: u64) -> Self {
        self.stats_interval = records;
        self
    }

    pub fn start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn fault_injection(mut self, fault: FaultInjection) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Set maximum clients
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.max_frame_bytes < DRF_MIN_BYTES {
            return Err(ConfigError::FrameLimit(self.max_frame_bytes));
        }
        if self.max_request_bytes < NF_BYTES + DRF_MIN_BYTES {
            return Err(ConfigError::BadValue {
                option: "max_request_bytes",
                value: self.max_request_bytes.to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::BadValue {
                option: "poll_interval",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
