//! Network frame and data record frame headers
//!
//! A record on the wire is an optional network frame (NF) envelope followed by
//! a data record frame (DRF). All fields are little-endian.
//!
//! ```text
//! +------------------+-----------------+----------------+-------------+
//! | NF (36, optional)| DRF header (64) | record payload | checksum (4)|
//! +------------------+-----------------+----------------+-------------+
//!                    |<-------------- DRF size ------------------------>|
//! ```
//!
//! Headers are decoded with explicit length checks before any field access.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use super::time::SevenKTime;
use crate::error::InvalidFrame;

/// Byte sum used as the 7K checksum
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

/// Network frame envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkFrame {
    pub protocol_version: u16,
    /// Offset from the start of the NF to the embedded DRF
    pub offset: u16,
    pub total_packets: u32,
    pub total_records: u16,
    pub tx_id: u16,
    /// NF plus DRF bytes in this packet
    pub packet_size: u32,
    /// DRF bytes across all packets
    pub total_size: u32,
    pub seq_number: u32,
    pub dest_dev_id: u32,
    pub dest_enumerator: u16,
    pub src_enumerator: u16,
    pub src_dev_id: u32,
}

impl NetworkFrame {
    /// Envelope for a single DRF of `drf_size` bytes
    pub fn for_record(drf_size: u32, tx_id: u16, seq_number: u32) -> Self {
        Self {
            protocol_version: NF_PROTOCOL_VERSION,
            offset: NF_BYTES as u16,
            total_packets: 1,
            total_records: 1,
            tx_id,
            packet_size: NF_BYTES as u32 + drf_size,
            total_size: drf_size,
            seq_number,
            dest_dev_id: DEVICE_7K_CENTER,
            dest_enumerator: 0,
            src_enumerator: 0,
            src_dev_id: 0,
        }
    }

    /// Decode the envelope fields (no semantic checks)
    pub fn parse(data: &[u8]) -> Result<Self, InvalidFrame> {
        if data.len() < NF_BYTES {
            return Err(InvalidFrame::Truncated {
                needed: NF_BYTES,
                available: data.len(),
            });
        }

        let mut buf = &data[..NF_BYTES];
        Ok(Self {
            protocol_version: buf.get_u16_le(),
            offset: buf.get_u16_le(),
            total_packets: buf.get_u32_le(),
            total_records: buf.get_u16_le(),
            tx_id: buf.get_u16_le(),
            packet_size: buf.get_u32_le(),
            total_size: buf.get_u32_le(),
            seq_number: buf.get_u32_le(),
            dest_dev_id: buf.get_u32_le(),
            dest_enumerator: buf.get_u16_le(),
            src_enumerator: buf.get_u16_le(),
            src_dev_id: buf.get_u32_le(),
        })
    }

    /// Check the protocol version only
    pub fn check_version(&self) -> Result<(), InvalidFrame> {
        if self.protocol_version != NF_PROTOCOL_VERSION {
            return Err(InvalidFrame::ProtocolVersion {
                found: self.protocol_version,
                expected: NF_PROTOCOL_VERSION,
            });
        }
        Ok(())
    }

    /// Check that this envelope describes exactly one self-consistent record
    pub fn validate(&self) -> Result<(), InvalidFrame> {
        self.check_version()?;

        if usize::from(self.offset) < NF_BYTES {
            return Err(InvalidFrame::Offset(self.offset));
        }
        if self.packet_size != self.total_size.wrapping_add(NF_BYTES as u32) {
            return Err(InvalidFrame::Envelope {
                packet_size: self.packet_size,
                total_size: self.total_size,
                drf_size: 0,
            });
        }
        if self.total_records != 1 {
            return Err(InvalidFrame::RecordCount(self.total_records));
        }
        Ok(())
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.protocol_version);
        buf.put_u16_le(self.offset);
        buf.put_u32_le(self.total_packets);
        buf.put_u16_le(self.total_records);
        buf.put_u16_le(self.tx_id);
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.total_size);
        buf.put_u32_le(self.seq_number);
        buf.put_u32_le(self.dest_dev_id);
        buf.put_u16_le(self.dest_enumerator);
        buf.put_u16_le(self.src_enumerator);
        buf.put_u32_le(self.src_dev_id);
    }
}

/// Data record frame header
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataRecordFrame {
    pub protocol_version: u16,
    /// Offset from the sync pattern to the record type header
    pub offset: u16,
    pub sync_pattern: u32,
    /// Header, payload and checksum
    pub size: u32,
    pub opt_data_offset: u32,
    pub opt_data_id: u32,
    pub time: SevenKTime,
    pub record_version: u16,
    pub record_type_id: u32,
    pub device_id: u32,
    pub reserved0: u16,
    pub sys_enumerator: u16,
    pub reserved1: u32,
    pub flags: u16,
    pub reserved2: u16,
    pub reserved3: u32,
    pub total_fragmented_records: u32,
    pub fragment_number: u32,
}

impl DataRecordFrame {
    /// Header for a new record with `payload_len` bytes between header and checksum
    pub fn new(record_type_id: u32, time: SevenKTime, payload_len: usize) -> Self {
        Self {
            protocol_version: DRF_PROTOCOL_VERSION,
            // Measured from the sync pattern, which sits 4 bytes into the header
            offset: (DRF_HEADER_BYTES - 4) as u16,
            sync_pattern: DRF_SYNC_PATTERN,
            size: (DRF_MIN_BYTES + payload_len) as u32,
            time,
            record_version: DRF_RECORD_VERSION,
            record_type_id,
            device_id: DEVICE_7K_CENTER,
            flags: DRF_FLAG_CHECKSUM,
            ..Default::default()
        }
    }

    /// Decode the header fields (no semantic checks)
    pub fn parse(data: &[u8]) -> Result<Self, InvalidFrame> {
        if data.len() < DRF_HEADER_BYTES {
            return Err(InvalidFrame::Truncated {
                needed: DRF_HEADER_BYTES,
                available: data.len(),
            });
        }

        let mut buf = &data[..DRF_HEADER_BYTES];
        Ok(Self {
            protocol_version: buf.get_u16_le(),
            offset: buf.get_u16_le(),
            sync_pattern: buf.get_u32_le(),
            size: buf.get_u32_le(),
            opt_data_offset: buf.get_u32_le(),
            opt_data_id: buf.get_u32_le(),
            time: SevenKTime::read(&mut buf),
            record_version: buf.get_u16_le(),
            record_type_id: buf.get_u32_le(),
            device_id: buf.get_u32_le(),
            reserved0: buf.get_u16_le(),
            sys_enumerator: buf.get_u16_le(),
            reserved1: buf.get_u32_le(),
            flags: buf.get_u16_le(),
            reserved2: buf.get_u16_le(),
            reserved3: buf.get_u32_le(),
            total_fragmented_records: buf.get_u32_le(),
            fragment_number: buf.get_u32_le(),
        })
    }

    /// Check version, sync pattern and that `size` fits in `[DRF_MIN_BYTES, max_len]`
    pub fn validate(&self, max_len: usize) -> Result<(), InvalidFrame> {
        if self.protocol_version != DRF_PROTOCOL_VERSION {
            return Err(InvalidFrame::ProtocolVersion {
                found: self.protocol_version,
                expected: DRF_PROTOCOL_VERSION,
            });
        }
        if self.sync_pattern != DRF_SYNC_PATTERN {
            return Err(InvalidFrame::SyncPattern(self.sync_pattern));
        }

        let size = self.size as usize;
        if size < DRF_MIN_BYTES || size > max_len {
            return Err(InvalidFrame::Size {
                size: self.size,
                min: DRF_MIN_BYTES as u32,
                max: max_len.min(u32::MAX as usize) as u32,
            });
        }
        Ok(())
    }

    /// Whether the trailing checksum is meaningful
    pub fn has_checksum(&self) -> bool {
        self.flags & DRF_FLAG_CHECKSUM != 0
    }

    /// Seconds since the Unix epoch
    pub fn timestamp(&self) -> Option<f64> {
        self.time.to_unix_seconds()
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.protocol_version);
        buf.put_u16_le(self.offset);
        buf.put_u32_le(self.sync_pattern);
        buf.put_u32_le(self.size);
        buf.put_u32_le(self.opt_data_offset);
        buf.put_u32_le(self.opt_data_id);
        self.time.write(buf);
        buf.put_u16_le(self.record_version);
        buf.put_u32_le(self.record_type_id);
        buf.put_u32_le(self.device_id);
        buf.put_u16_le(self.reserved0);
        buf.put_u16_le(self.sys_enumerator);
        buf.put_u32_le(self.reserved1);
        buf.put_u16_le(self.flags);
        buf.put_u16_le(self.reserved2);
        buf.put_u32_le(self.reserved3);
        buf.put_u32_le(self.total_fragmented_records);
        buf.put_u32_le(self.fragment_number);
    }

    /// Build a complete DRF (header, payload, checksum).
    ///
    /// `size` is set from the payload length; the checksum flag is honored.
    pub fn build(mut self, payload: &[u8]) -> Bytes {
        self.size = (DRF_MIN_BYTES + payload.len()) as u32;

        let mut buf = BytesMut::with_capacity(self.size as usize);
        self.write(&mut buf);
        buf.put_slice(payload);

        let sum = if self.has_checksum() { checksum(&buf) } else { 0 };
        buf.put_u32_le(sum);
        buf.freeze()
    }
}

/// Verify the trailing checksum of a complete DRF
pub fn verify_checksum(drf: &[u8]) -> Result<(), InvalidFrame> {
    if drf.len() < DRF_MIN_BYTES {
        return Err(InvalidFrame::Truncated {
            needed: DRF_MIN_BYTES,
            available: drf.len(),
        });
    }

    let (body, tail) = drf.split_at(drf.len() - CHECKSUM_BYTES);
    let stored = (&tail[..]).get_u32_le();
    let computed = checksum(body);
    if stored != computed {
        return Err(InvalidFrame::Checksum { stored, computed });
    }
    Ok(())
}
