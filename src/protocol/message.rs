//! Control channel messages
//!
//! Clients talk to the server with one of three requests:
//!
//! - ASCII `STOP`, answered with `ACK`, stops the server
//! - ASCII `REQ`, answered with `ACK`, a liveness probe
//! - a binary subscribe record, answered with a subscribe ACK record
//!
//! Subscribe request layout:
//!
//! ```text
//! +---------+-----------------+---------------------------+-----------+-------------------+----------+
//! | NF (36) | DRF header (64) | remcon id, ticket, track  | count u32 | count x i32 types | checksum |
//! |         | type 7500       | (4 + 4 + 16)              |           |                   |          |
//! +---------+-----------------+---------------------------+-----------+-------------------+----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codec::encode;
use super::constants::*;
use super::frame::{DataRecordFrame, NetworkFrame};
use super::time::SevenKTime;
use crate::error::ControlError;

pub const STOP_REQUEST: &[u8] = b"STOP";
pub const PING_REQUEST: &[u8] = b"REQ";
pub const ACK_REPLY: &[u8] = b"ACK";

/// Offset of the subscription count in a subscribe request
const SUBSCRIBE_COUNT_OFFSET: usize = NF_BYTES + DRF_HEADER_BYTES + REMCON_HEADER_BYTES;

/// Smallest well-formed subscribe request (no record types)
const SUBSCRIBE_MIN_BYTES: usize = SUBSCRIBE_COUNT_OFFSET + 4 + CHECKSUM_BYTES;

/// A parsed control request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Ping,
    Subscribe(SubscribeRequest),
}

/// Subscribe request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub tx_id: u16,
    pub ticket: u32,
    pub tracking_number: [u8; TRACKING_NUMBER_BYTES],
    pub record_types: Vec<i32>,
}

/// Subscribe ACK body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAck {
    pub ticket: u32,
    pub tracking_number: [u8; TRACKING_NUMBER_BYTES],
}

fn is_prefix_of(buf: &[u8], request: &[u8]) -> bool {
    buf.len() < request.len() && request.starts_with(buf)
}

/// Total length of the request starting in `buf`.
///
/// Returns `Ok(None)` while more bytes are needed to tell. Binary requests
/// are sized from the NF `packet_size`, bounded by `max_len`.
pub fn request_len(buf: &[u8], max_len: usize) -> Result<Option<usize>, ControlError> {
    if buf.starts_with(STOP_REQUEST) {
        return Ok(Some(STOP_REQUEST.len()));
    }
    if buf.starts_with(PING_REQUEST) {
        return Ok(Some(PING_REQUEST.len()));
    }
    if buf.is_empty() || is_prefix_of(buf, STOP_REQUEST) || is_prefix_of(buf, PING_REQUEST) {
        return Ok(None);
    }

    let version = NF_PROTOCOL_VERSION.to_le_bytes();
    if buf[0] != version[0] || (buf.len() > 1 && buf[1] != version[1]) {
        return Err(ControlError::Unrecognized(printable(buf)));
    }
    if buf.len() < NF_BYTES {
        return Ok(None);
    }

    let nf = NetworkFrame::parse(buf)?;
    nf.check_version()?;

    let len = nf.packet_size as usize;
    if len < SUBSCRIBE_MIN_BYTES {
        return Err(ControlError::Undersized {
            len,
            needed: SUBSCRIBE_MIN_BYTES,
        });
    }
    if len > max_len {
        return Err(ControlError::Oversized { len, max: max_len });
    }
    Ok(Some(len))
}

/// Parse a complete request
pub fn parse(data: &[u8]) -> Result<ControlRequest, ControlError> {
    if data.starts_with(STOP_REQUEST) {
        return Ok(ControlRequest::Stop);
    }
    if data.starts_with(PING_REQUEST) {
        return Ok(ControlRequest::Ping);
    }
    if data.len() < SUBSCRIBE_MIN_BYTES {
        return Err(ControlError::Undersized {
            len: data.len(),
            needed: SUBSCRIBE_MIN_BYTES,
        });
    }

    let nf = NetworkFrame::parse(data)?;
    nf.check_version()?;

    let drf = DataRecordFrame::parse(&data[NF_BYTES..])?;
    drf.validate(data.len() - NF_BYTES)?;
    if drf.record_type_id != RT_REMOTE_CONTROL {
        return Err(ControlError::Unrecognized(format!(
            "record type {}",
            drf.record_type_id
        )));
    }

    let mut body = &data[NF_BYTES + DRF_HEADER_BYTES..];
    let remcon_id = body.get_u32_le();
    if remcon_id != REMCON_SUBSCRIBE {
        return Err(ControlError::Unrecognized(format!(
            "remote control id {}",
            remcon_id
        )));
    }
    let ticket = body.get_u32_le();
    let mut tracking_number = [0u8; TRACKING_NUMBER_BYTES];
    body.copy_to_slice(&mut tracking_number);

    let count = body.get_u32_le() as usize;
    let needed = count
        .checked_mul(4)
        .and_then(|n| n.checked_add(SUBSCRIBE_COUNT_OFFSET + 4))
        .unwrap_or(usize::MAX);
    if needed > data.len() {
        return Err(ControlError::Undersized {
            len: data.len(),
            needed,
        });
    }

    let record_types = (0..count).map(|_| body.get_i32_le()).collect();

    Ok(ControlRequest::Subscribe(SubscribeRequest {
        tx_id: nf.tx_id,
        ticket,
        tracking_number,
        record_types,
    }))
}

/// Build a subscribe request for `record_types`
pub fn subscribe_request(record_types: &[i32], tx_id: u16) -> Bytes {
    let mut body = BytesMut::with_capacity(REMCON_HEADER_BYTES + 4 + record_types.len() * 4);
    body.put_u32_le(REMCON_SUBSCRIBE);
    body.put_u32_le(ACK_TICKET);
    body.put_slice(&[0u8; TRACKING_NUMBER_BYTES]);
    body.put_u32_le(record_types.len() as u32);
    for record_type in record_types {
        body.put_i32_le(*record_type);
    }

    let drf = DataRecordFrame::new(RT_REMOTE_CONTROL, SevenKTime::now(), body.len()).build(&body);
    encode(&drf, tx_id, 0)
}

/// Build the reply to a subscribe request
pub fn subscribe_ack(tx_id: u16) -> Bytes {
    let mut body = BytesMut::with_capacity(REMCON_ACK_HEADER_BYTES);
    body.put_u32_le(ACK_TICKET);
    body.put_slice(ACK_TRACKING_NUMBER);

    let drf =
        DataRecordFrame::new(RT_REMOTE_CONTROL_ACK, SevenKTime::now(), body.len()).build(&body);
    encode(&drf, tx_id, 0)
}

impl SubscribeAck {
    /// Parse a complete subscribe ACK record including its NF
    pub fn parse(data: &[u8]) -> Result<Self, ControlError> {
        let needed = NF_BYTES + DRF_MIN_BYTES + REMCON_ACK_HEADER_BYTES;
        if data.len() < needed {
            return Err(ControlError::Undersized {
                len: data.len(),
                needed,
            });
        }

        let nf = NetworkFrame::parse(data)?;
        nf.validate()?;
        let drf = DataRecordFrame::parse(&data[NF_BYTES..])?;
        drf.validate(data.len() - NF_BYTES)?;
        if drf.record_type_id != RT_REMOTE_CONTROL_ACK {
            return Err(ControlError::Unrecognized(format!(
                "record type {}",
                drf.record_type_id
            )));
        }

        let mut body = &data[NF_BYTES + DRF_HEADER_BYTES..];
        let ticket = body.get_u32_le();
        let mut tracking_number = [0u8; TRACKING_NUMBER_BYTES];
        body.copy_to_slice(&mut tracking_number);
        Ok(Self {
            ticket,
            tracking_number,
        })
    }
}

/// Short printable rendering of a request for logs
fn printable(buf: &[u8]) -> String {
    buf.iter()
        .take(16)
        .map(|&b| {
            if b.is_ascii_graphic() {
                (b as char).to_string()
            } else {
                format!("\\x{:02x}", b)
            }
        })
        .collect()
}
