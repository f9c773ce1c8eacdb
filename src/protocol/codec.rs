//! Frame codec
//!
//! Reads one validated frame at a time from a byte source and wraps raw data
//! record frames in a network frame for transmission. Sources are trusted
//! recordings, so a bad frame ends the source instead of triggering a resync.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::constants::*;
use super::frame::{verify_checksum, DataRecordFrame, NetworkFrame};
use crate::error::{FrameError, InvalidFrame};

/// Layout of the records in a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Bare data record frames, re-wrapped on output
    #[default]
    RawDrf,
    /// Each record is already preceded by its network frame
    NetworkFramed,
}

/// One decoded frame
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    drf_offset: usize,
    header: DataRecordFrame,
    envelope: Option<NetworkFrame>,
}

impl Frame {
    /// Record type of the embedded DRF
    pub fn record_type(&self) -> u32 {
        self.header.record_type_id
    }

    /// Embedded sonar time in Unix seconds
    pub fn timestamp(&self) -> Option<f64> {
        self.header.timestamp()
    }

    /// Bytes as read from the source
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    /// The DRF alone, without any recorded envelope
    pub fn drf_bytes(&self) -> Bytes {
        self.data.slice(self.drf_offset..)
    }

    pub fn header(&self) -> &DataRecordFrame {
        &self.header
    }

    pub fn envelope(&self) -> Option<&NetworkFrame> {
        self.envelope.as_ref()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes; a short read is a truncated frame
async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let n = read_full(reader, buf).await?;
    if n < buf.len() {
        return Err(InvalidFrame::Truncated {
            needed: buf.len(),
            available: n,
        }
        .into());
    }
    Ok(())
}

/// Read the first header of a frame. Returns `EndOfStream` only when the
/// source ends exactly at a frame boundary.
async fn read_leading<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    match read_full(reader, buf).await? {
        0 => Err(FrameError::EndOfStream),
        n if n < buf.len() => Err(InvalidFrame::Truncated {
            needed: buf.len(),
            available: n,
        }
        .into()),
        _ => Ok(()),
    }
}

/// Decode and validate the next frame.
///
/// `max_len` bounds the DRF size. Headers are validated before the payload
/// buffer is sized, so a corrupt size never drives an allocation.
pub async fn decode<R>(
    reader: &mut R,
    max_len: usize,
    mode: InputMode,
) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::new();

    let envelope = match mode {
        InputMode::RawDrf => None,
        InputMode::NetworkFramed => {
            buf.resize(NF_BYTES, 0);
            read_leading(reader, &mut buf[..]).await?;
            let nf = NetworkFrame::parse(&buf)?;
            nf.validate()?;

            // Anything between the NF and the DRF is carried along untouched
            let gap = usize::from(nf.offset) - NF_BYTES;
            if gap > 0 {
                buf.resize(NF_BYTES + gap, 0);
                read_exact(reader, &mut buf[NF_BYTES..]).await?;
            }
            Some(nf)
        }
    };

    let drf_offset = buf.len();
    buf.resize(drf_offset + DRF_HEADER_BYTES, 0);
    if envelope.is_some() {
        read_exact(reader, &mut buf[drf_offset..]).await?;
    } else {
        read_leading(reader, &mut buf[drf_offset..]).await?;
    }

    let header = DataRecordFrame::parse(&buf[drf_offset..])?;
    header.validate(max_len)?;

    if let Some(nf) = &envelope {
        if nf.total_size != header.size {
            return Err(InvalidFrame::Envelope {
                packet_size: nf.packet_size,
                total_size: nf.total_size,
                drf_size: header.size,
            }
            .into());
        }
    }

    let total = drf_offset + header.size as usize;
    buf.resize(total, 0);
    read_exact(reader, &mut buf[drf_offset + DRF_HEADER_BYTES..]).await?;

    if header.has_checksum() {
        verify_checksum(&buf[drf_offset..])?;
    }

    Ok(Frame {
        data: buf.freeze(),
        drf_offset,
        header,
        envelope,
    })
}

/// Wrap a DRF in a fresh network frame
pub fn encode(drf: &[u8], tx_id: u16, seq_number: u32) -> Bytes {
    let nf = NetworkFrame::for_record(drf.len() as u32, tx_id, seq_number);

    let mut buf = BytesMut::with_capacity(NF_BYTES + drf.len());
    nf.write(&mut buf);
    buf.put_slice(drf);
    buf.freeze()
}
