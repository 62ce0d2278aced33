//! PDU framing: the 16-byte header codec, the length-delimited frame
//! reader/writer and sequence number generation.
//!
//! The [`Encoder`] and [`Decoder`] are the only pieces of the crate that
//! touch the byte stream. Everything above them works with the [`Pdu`] sum
//! type; everything below is `AsyncRead`/`AsyncWrite`.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pdu::{CommandId, CommandStatus, Pdu};

/// Size of the PDU header common to all commands.
pub const HEADER_LEN: usize = 16;

/// Maximal size of a PDU in bytes, header included.
pub const MAX_PDU_LEN: usize = 4096;

/// Starting reference for sequence numbers.
pub const SEQUENCE_START: u32 = 0x0000_0001;

/// Sequence number upper boundary.
pub const SEQUENCE_END: u32 = 0x7FFF_FFFF;

/// Errors produced while encoding or decoding PDUs.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("pdu body too short decoding '{0}'")]
    BodyTooShort(&'static str),

    #[error("c-string '{0}' is unterminated within its length limit")]
    InvalidCStringLength(&'static str),

    #[error("octet-string '{0}' length prefix exceeds its limit")]
    InvalidStringLength(&'static str),

    #[error("invalid tlv length")]
    InvalidTlvLength,

    #[error("invalid time format '{0}'")]
    InvalidTimeFormat(String),

    #[error("invalid delivery receipt format")]
    InvalidReceiptFormat,

    #[error("command {0:?} is not supported yet")]
    Unsupported(CommandId),

    #[error("field '{0}' is not valid utf-8")]
    InvalidUtf8(&'static str),

    #[error("pdu length {0} under the {HEADER_LEN} byte minimum")]
    LengthBelowMinimum(u32),

    #[error("pdu length {0} over the {MAX_PDU_LEN} byte maximum")]
    LengthAboveMaximum(u32),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded PDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u32,
    pub command_id: CommandId,
    pub status: CommandStatus,
    pub sequence: u32,
}

/// Source of sequence numbers for outbound requests.
///
/// The default implementation is a monotonic counter, but a custom one can
/// be shared between sessions when requests should draw from a single
/// numbering space.
pub trait Sequencer: Send + Sync {
    fn next(&self) -> u32;
}

/// Monotonic sequencer wrapping from [`SEQUENCE_END`] back to
/// [`SEQUENCE_START`].
pub struct DefaultSequencer {
    n: AtomicU32,
}

impl DefaultSequencer {
    /// Creates a sequencer with the starting value set to `n`. Values
    /// outside `[SEQUENCE_START, SEQUENCE_END]` are clamped to the start.
    pub fn new(n: u32) -> Self {
        let n = if n == 0 || n > SEQUENCE_END {
            SEQUENCE_START
        } else {
            n
        };
        DefaultSequencer {
            n: AtomicU32::new(n),
        }
    }
}

impl Default for DefaultSequencer {
    fn default() -> Self {
        Self::new(SEQUENCE_START)
    }
}

impl Sequencer for DefaultSequencer {
    fn next(&self) -> u32 {
        let mut prev = self.n.load(Ordering::Relaxed);
        loop {
            let next = if prev == SEQUENCE_END {
                SEQUENCE_START
            } else {
                prev + 1
            };
            match self
                .n
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return prev,
                Err(observed) => prev = observed,
            }
        }
    }
}

/// Assembles a full wire frame for `pdu`: header plus marshaled body.
///
/// Frames over [`MAX_PDU_LEN`] are rejected at encode time.
pub fn frame(pdu: &Pdu, sequence: u32, status: CommandStatus) -> Result<Vec<u8>, CodecError> {
    let body = pdu.marshal()?;
    let length = HEADER_LEN + body.len();
    if length > MAX_PDU_LEN {
        return Err(CodecError::LengthAboveMaximum(length as u32));
    }
    let mut buf = BytesMut::with_capacity(length);
    buf.put_u32(length as u32);
    buf.put_u32(pdu.command_id() as u32);
    buf.put_u32(u32::from(status));
    buf.put_u32(sequence);
    buf.extend_from_slice(&body);
    Ok(buf.to_vec())
}

/// Writes PDUs to a sink, assigning sequence numbers as it goes.
///
/// Each frame goes out through a single `write_all`, so a PDU either
/// reaches the stream whole or the write fails; this type never leaves the
/// stream mid-frame.
pub struct Encoder<W> {
    w: W,
    seq: Arc<dyn Sequencer>,
}

impl<W: AsyncWrite + Unpin> Encoder<W> {
    /// Creates an encoder over `w`. Without an explicit sequencer a
    /// [`DefaultSequencer`] starting at [`SEQUENCE_START`] is used.
    pub fn new(w: W, seq: Option<Arc<dyn Sequencer>>) -> Self {
        Encoder {
            w,
            seq: seq.unwrap_or_else(|| Arc::new(DefaultSequencer::default())),
        }
    }

    /// Encodes `pdu` with the next sequence number and an OK status,
    /// returning the sequence actually written.
    pub async fn encode(&mut self, pdu: &Pdu) -> Result<u32, CodecError> {
        self.encode_with(pdu, None, CommandStatus::Ok).await
    }

    /// Encodes `pdu` with an explicit status and, when `sequence` is given,
    /// an explicit sequence number. Responses echo the sequence of the
    /// request they answer through this path.
    pub async fn encode_with(
        &mut self,
        pdu: &Pdu,
        sequence: Option<u32>,
        status: CommandStatus,
    ) -> Result<u32, CodecError> {
        let sequence = sequence.unwrap_or_else(|| self.seq.next());
        let buf = frame(pdu, sequence, status)?;
        self.w.write_all(&buf).await?;
        self.w.flush().await?;
        Ok(sequence)
    }

    /// Shuts the underlying sink down, ignoring errors from an already
    /// broken stream.
    pub async fn shutdown(&mut self) {
        let _ = self.w.shutdown().await;
    }
}

/// Outcome of reading one frame off the stream.
///
/// Frames with an unrecognized command id or a malformed body are fully
/// consumed so the stream stays in sync and the session can decide how to
/// answer; only transport and framing failures are hard errors.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed PDU.
    Pdu(Header, Pdu),
    /// A frame whose command id is not in the supported set.
    Unknown { id: u32, sequence: u32 },
    /// A frame with a known command id whose body failed to unmarshal.
    Malformed(Header, CodecError),
}

/// Reads `(Header, Pdu)` pairs from a source. Stateless beyond the reader.
pub struct Decoder<R> {
    r: R,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    pub fn new(r: R) -> Self {
        Decoder { r }
    }

    /// Reads the next frame. Returns `Ok(None)` on a clean end of stream at
    /// a frame boundary; end of stream inside a frame is an error.
    pub async fn decode(&mut self) -> Result<Option<Decoded>, CodecError> {
        let mut head = [0u8; HEADER_LEN];
        match self.r.read_exact(&mut head).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        let id_raw = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        let status_raw = u32::from_be_bytes([head[8], head[9], head[10], head[11]]);
        let sequence = u32::from_be_bytes([head[12], head[13], head[14], head[15]]);

        if (length as usize) < HEADER_LEN {
            return Err(CodecError::LengthBelowMinimum(length));
        }
        if length as usize > MAX_PDU_LEN {
            return Err(CodecError::LengthAboveMaximum(length));
        }

        let mut body = vec![0u8; length as usize - HEADER_LEN];
        if !body.is_empty() {
            self.r.read_exact(&mut body).await?;
        }

        let command_id = match CommandId::try_from(id_raw) {
            Ok(id) => id,
            Err(_) => return Ok(Some(Decoded::Unknown { id: id_raw, sequence })),
        };
        let header = Header {
            length,
            command_id,
            status: CommandStatus::from(status_raw),
            sequence,
        };
        match Pdu::unmarshal(command_id, &body) {
            Ok(pdu) => Ok(Some(Decoded::Pdu(header, pdu))),
            Err(err) => Ok(Some(Decoded::Malformed(header, err))),
        }
    }
}

/// Reads a null-terminated string of at most `limit` bytes, terminator
/// included, advancing the cursor past the terminator.
pub(crate) fn read_cstring(
    buf: &mut Cursor<&[u8]>,
    limit: usize,
    field: &'static str,
) -> Result<String, CodecError> {
    let mut out = Vec::new();
    for i in 1..=limit {
        if !buf.has_remaining() {
            return Err(CodecError::InvalidCStringLength(field));
        }
        let b = buf.get_u8();
        if b == 0 {
            return String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8(field));
        }
        if i == limit {
            return Err(CodecError::InvalidCStringLength(field));
        }
        out.push(b);
    }
    Err(CodecError::InvalidCStringLength(field))
}

/// Reads a single-byte-length-prefixed octet string of at most `limit`
/// bytes.
pub(crate) fn read_string(
    buf: &mut Cursor<&[u8]>,
    limit: usize,
    field: &'static str,
) -> Result<String, CodecError> {
    let l = read_u8(buf, field)? as usize;
    if l > limit {
        return Err(CodecError::InvalidStringLength(field));
    }
    if buf.remaining() < l {
        return Err(CodecError::BodyTooShort(field));
    }
    let mut out = vec![0u8; l];
    buf.copy_to_slice(&mut out);
    String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8(field))
}

pub(crate) fn read_u8(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::BodyTooShort(field));
    }
    Ok(buf.get_u8())
}

/// Appends `s` followed by the null terminator.
pub(crate) fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.put_u8(0);
}
