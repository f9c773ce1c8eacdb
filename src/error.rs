//! Error types
//!
//! Each layer has its own error enum; `Error` wraps them for the server
//! lifecycle and the binary.

use std::fmt;
use std::io;

/// Result alias used by the server lifecycle
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(io::Error),
    /// Source frame could not be decoded
    Frame(FrameError),
    /// Control request could not be served
    Control(ControlError),
    /// Configuration rejected at startup
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Frame(e) => write!(f, "Frame error: {}", e),
            Error::Control(e) => write!(f, "Control error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Frame(e) => Some(e),
            Error::Control(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}

impl From<ControlError> for Error {
    fn from(e: ControlError) -> Self {
        Error::Control(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Reason a frame was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidFrame {
    /// Protocol version field did not match
    ProtocolVersion { found: u16, expected: u16 },
    /// DRF sync pattern did not match
    SyncPattern(u32),
    /// Declared size is below the header size or above the limit
    Size { size: u32, min: u32, max: u32 },
    /// NF header offset points inside the NF header
    Offset(u16),
    /// NF sizes disagree with each other or with the embedded DRF
    Envelope {
        packet_size: u32,
        total_size: u32,
        drf_size: u32,
    },
    /// NF carries more than one record
    RecordCount(u16),
    /// Stored checksum differs from the computed one
    Checksum { stored: u32, computed: u32 },
    /// Input ended inside a frame, or a buffer is shorter than the header
    Truncated { needed: usize, available: usize },
}

impl fmt::Display for InvalidFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidFrame::ProtocolVersion { found, expected } => {
                write!(f, "protocol version {} (expected {})", found, expected)
            }
            InvalidFrame::SyncPattern(sync) => write!(f, "sync pattern 0x{:08X}", sync),
            InvalidFrame::Size { size, min, max } => {
                write!(f, "size {} outside [{}, {}]", size, min, max)
            }
            InvalidFrame::Offset(offset) => write!(f, "header offset {}", offset),
            InvalidFrame::Envelope {
                packet_size,
                total_size,
                drf_size,
            } => write!(
                f,
                "envelope mismatch packet_size={} total_size={} drf_size={}",
                packet_size, total_size, drf_size
            ),
            InvalidFrame::RecordCount(n) => write!(f, "{} records in one network frame", n),
            InvalidFrame::Checksum { stored, computed } => write!(
                f,
                "checksum 0x{:08X} (computed 0x{:08X})",
                stored, computed
            ),
            InvalidFrame::Truncated { needed, available } => {
                write!(f, "truncated: needed {} bytes, have {}", needed, available)
            }
        }
    }
}

/// Error reading a frame from a source
#[derive(Debug)]
pub enum FrameError {
    /// Clean end of input at a frame boundary
    EndOfStream,
    /// Frame failed validation
    Invalid(InvalidFrame),
    /// Underlying read failed
    Io(io::Error),
}

impl FrameError {
    /// True for a clean end of input
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, FrameError::EndOfStream)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::EndOfStream => write!(f, "end of stream"),
            FrameError::Invalid(reason) => write!(f, "invalid frame: {}", reason),
            FrameError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<InvalidFrame> for FrameError {
    fn from(reason: InvalidFrame) -> Self {
        FrameError::Invalid(reason)
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

/// Error serving a control-channel request
#[derive(Debug)]
pub enum ControlError {
    /// Peer closed before sending a full request
    Closed,
    /// Request did not arrive within the request timeout
    Timeout,
    /// Request is shorter than its headers require
    Undersized { len: usize, needed: usize },
    /// Request declares more bytes than the server accepts
    Oversized { len: usize, max: usize },
    /// Headers parsed but the request is not one we serve
    Unrecognized(String),
    /// Headers failed frame validation
    Malformed(InvalidFrame),
    /// Subscribe refused because the registry is full
    RegistryFull(usize),
    /// Socket failure while reading or replying
    Io(io::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Closed => write!(f, "connection closed before request"),
            ControlError::Timeout => write!(f, "request timed out"),
            ControlError::Undersized { len, needed } => {
                write!(f, "request of {} bytes, need {}", len, needed)
            }
            ControlError::Oversized { len, max } => {
                write!(f, "request of {} bytes exceeds limit {}", len, max)
            }
            ControlError::Unrecognized(what) => write!(f, "unrecognized request: {}", what),
            ControlError::Malformed(reason) => write!(f, "malformed request: {}", reason),
            ControlError::RegistryFull(max) => write!(f, "client limit {} reached", max),
            ControlError::Io(e) => write!(f, "socket error: {}", e),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<io::Error> for ControlError {
    fn from(e: io::Error) -> Self {
        ControlError::Io(e)
    }
}

impl From<InvalidFrame> for ControlError {
    fn from(reason: InvalidFrame) -> Self {
        ControlError::Malformed(reason)
    }
}

/// Startup configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No input files given
    NoSources,
    /// Host/port could not be resolved to a socket address
    BadAddress(String),
    /// Frame buffer limit cannot hold a minimal frame
    FrameLimit(usize),
    /// Malformed option value
    BadValue { option: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoSources => write!(f, "no input files"),
            ConfigError::BadAddress(addr) => write!(f, "cannot resolve address {}", addr),
            ConfigError::FrameLimit(n) => write!(f, "max frame size {} is too small", n),
            ConfigError::BadValue { option, value } => {
                write!(f, "invalid value {:?} for {}", value, option)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
