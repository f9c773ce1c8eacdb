//! 7K wire protocol constants

/// Network frame (outer envelope) size in bytes
pub const NF_BYTES: usize = 36;

/// Network frame protocol version
pub const NF_PROTOCOL_VERSION: u16 = 5;

/// Data record frame header size in bytes
pub const DRF_HEADER_BYTES: usize = 64;

/// Data record frame protocol version
pub const DRF_PROTOCOL_VERSION: u16 = 5;

/// Data record frame sync pattern
pub const DRF_SYNC_PATTERN: u32 = 0x0000_FFFF;

/// Record version written into frames we build
pub const DRF_RECORD_VERSION: u16 = 1;

/// Trailing checksum size in bytes
pub const CHECKSUM_BYTES: usize = 4;

/// Smallest legal DRF: header plus checksum, no payload
pub const DRF_MIN_BYTES: usize = DRF_HEADER_BYTES + CHECKSUM_BYTES;

/// DRF flags bit: checksum field is valid
pub const DRF_FLAG_CHECKSUM: u16 = 0x0001;

/// Default upper bound for one frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 60_000;

/// Remote control record
pub const RT_REMOTE_CONTROL: u32 = 7500;

/// Remote control acknowledge record
pub const RT_REMOTE_CONTROL_ACK: u32 = 7501;

/// Remote control not-acknowledge record
pub const RT_REMOTE_CONTROL_NAK: u32 = 7502;

/// Remote control id: subscribe to records
pub const REMCON_SUBSCRIBE: u32 = 1051;

/// Device id of the 7K Center
pub const DEVICE_7K_CENTER: u32 = 7000;

/// Size of the tracking number in remote control headers
pub const TRACKING_NUMBER_BYTES: usize = 16;

/// Remote control (7500) record type header: id, ticket, tracking number
pub const REMCON_HEADER_BYTES: usize = 4 + 4 + TRACKING_NUMBER_BYTES;

/// Remote control ACK (7501) record type header: ticket, tracking number
pub const REMCON_ACK_HEADER_BYTES: usize = 4 + TRACKING_NUMBER_BYTES;

/// Tracking number returned in subscribe acknowledgements
pub const ACK_TRACKING_NUMBER: &[u8; TRACKING_NUMBER_BYTES] = b"ABCDEF0123456789";

/// Ticket returned in subscribe acknowledgements
pub const ACK_TICKET: u32 = 1;

/// Default 7K Center TCP port
pub const DEFAULT_PORT: u16 = 7000;
