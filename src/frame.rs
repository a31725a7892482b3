// Wire codec for the Terraria packet format — framing, typed accessors, and
// the 7-bit LEB128 string length encoding used by .NET's BinaryWriter.
//
// This mirrors the split the teacher's SMPP codec makes between a header
// type, typed encode/decode free functions operating on any byte sink, and
// a dedicated frame-builder type — see `iainh-smpp/src/codec.rs`.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Minimum legal frame length: 2 header length bytes + 1 type byte.
pub const HEADER_LEN: usize = 3;

/// Errors produced while reading or writing frames and their typed fields.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame header declared a length smaller than [`HEADER_LEN`].
    #[error("frame declares invalid length {length} (minimum {HEADER_LEN})")]
    BadLength { length: u16 },

    /// The stream ended before a complete frame (or a complete typed field)
    /// could be read. For frame reads this terminates the connection
    /// cleanly; for [`FrameReader`] accessors the cursor is left unchanged
    /// and the caller may retry with more data.
    #[error("end of input")]
    EndOfInput,

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),

    /// Any other transport error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One length-prefixed Terraria packet.
///
/// On the wire: `[len_lo, len_hi, type, payload...]` where `len` is a
/// little-endian `u16` counting all three header bytes plus the payload.
/// `len == 3 + payload.len()` always holds for a `Frame` constructed by
/// this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Build a frame from a type byte and payload, failing if the total
    /// length would overflow the 16-bit header field.
    pub fn new(type_byte: u8, payload: &[u8]) -> Result<Frame, CodecError> {
        let total = HEADER_LEN + payload.len();
        let len: u16 = total
            .try_into()
            .map_err(|_| CodecError::BadLength { length: u16::MAX })?;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u16_le(len);
        buf.put_u8(type_byte);
        buf.put_slice(payload);

        Ok(Frame { bytes: buf.freeze() })
    }

    /// Total length in bytes, including the 3-byte header. Always `>= 3`.
    pub fn length(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0], self.bytes[1]])
    }

    /// The packet's type byte.
    pub fn type_byte(&self) -> u8 {
        self.bytes[2]
    }

    /// The packet's payload, excluding the 3-byte header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// `true` if this frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// The frame's full on-wire representation, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A [`FrameReader`] positioned at the start of the payload.
    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader {
            frame: self,
            pos: HEADER_LEN,
        }
    }

    /// Parse a frame's header + payload out of an already-buffered byte
    /// slice known to hold at least `length()` bytes. Used by
    /// [`crate::connection`] once it has buffered a full frame.
    pub(crate) fn from_buffered(buf: &[u8]) -> Result<Frame, CodecError> {
        let len = u16::from_le_bytes([buf[0], buf[1]]);
        if (len as usize) < HEADER_LEN {
            return Err(CodecError::BadLength { length: len });
        }
        Ok(Frame {
            bytes: Bytes::copy_from_slice(&buf[..len as usize]),
        })
    }
}

/// A transient read cursor over a [`Frame`]'s payload.
///
/// The cursor starts at byte offset 3 (the first payload byte). Every
/// accessor either advances the cursor by exactly the number of bytes
/// consumed and returns the decoded value, or leaves the cursor unchanged
/// and returns [`CodecError::EndOfInput`] — multi-byte reads never advance
/// partway through a value.
pub struct FrameReader<'a> {
    frame: &'a Frame,
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.frame.bytes().len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let bytes = self.frame.bytes();
        if bytes.len() - self.pos < n {
            return Err(CodecError::EndOfInput);
        }
        let start = self.pos;
        self.pos += n;
        Ok(&bytes[start..start + n])
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read exactly `n` raw bytes with no length prefix.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    /// Read a 7-bit LEB128 length-prefixed, UTF-8 string (.NET
    /// `BinaryWriter` style). Accepts the 1- and 2-byte prefix forms, which
    /// cover every length a packet can carry (0..=65532).
    ///
    /// Decoding is `(b0 & 0x7F) | ((b1 as u16) << 7)` when the high bit of
    /// `b0` is set — *not* `(b0 - 128) + (b1 << 7)` done in 8-bit width,
    /// which is a known bug in the wire format's originating
    /// implementation that silently drops the top bit of `b1`.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let saved = self.pos;
        let len = match self.read_leb128_len() {
            Ok(len) => len,
            Err(e) => {
                self.pos = saved;
                return Err(e);
            }
        };
        match self.take(len as usize) {
            Ok(bytes) => String::from_utf8(bytes.to_vec()).map_err(|e| {
                self.pos = saved;
                CodecError::InvalidUtf8(e)
            }),
            Err(e) => {
                self.pos = saved;
                Err(e)
            }
        }
    }

    fn read_leb128_len(&mut self) -> Result<u16, CodecError> {
        let b0 = self.read_u8()?;
        if b0 < 0x80 {
            return Ok(b0 as u16);
        }
        let b1 = self.read_u8()?;
        Ok((b0 & 0x7F) as u16 | ((b1 as u16) << 7))
    }
}

/// Grow-on-demand buffer that builds a finalized [`Frame`].
///
/// Reserves the first three bytes for the header, then appends typed
/// values via the same encode helpers a generic byte sink could use.
/// [`FrameWriter::finish`] patches the length into those reserved bytes and
/// returns the resulting [`Frame`] — mirroring how the teacher's
/// `PduHeader::encode` reserves space then patches `command_length` after
/// the body is known.
#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    pub fn new() -> FrameWriter {
        let mut buf = BytesMut::new();
        buf.put_bytes(0, HEADER_LEN);
        FrameWriter { buf }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(value as u8);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16_le(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.buf.put_i64_le(value);
        self
    }

    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_u32_le(value.to_bits());
        self
    }

    pub fn put_f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_u64_le(value.to_bits());
        self
    }

    /// Append raw bytes with no length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Append a 7-bit LEB128 length-prefixed UTF-8 string. Emits the
    /// minimal form: one byte when `len < 128`, two bytes otherwise.
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let len = bytes.len() as u16;
        if len < 128 {
            self.buf.put_u8(len as u8);
        } else {
            self.buf.put_u8((len & 0x7F) as u8 | 0x80);
            self.buf.put_u8((len >> 7) as u8);
        }
        self.buf.put_slice(bytes);
        self
    }

    /// Stamp the length into the reserved header bytes and return the
    /// finished frame.
    pub fn finish(mut self, type_byte: u8) -> Result<Frame, CodecError> {
        let len: u16 = self
            .buf
            .len()
            .try_into()
            .map_err(|_| CodecError::BadLength { length: u16::MAX })?;
        self.buf[0..2].copy_from_slice(&len.to_le_bytes());
        self.buf[2] = type_byte;
        Ok(Frame {
            bytes: self.buf.freeze(),
        })
    }
}
