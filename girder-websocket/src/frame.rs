//! RFC 6455 frame codec.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! [`Frame::decode`] works on a single buffer and reports
//! [`FrameError::Incomplete`] when the buffer ends early. [`FrameDecoder`]
//! keeps the leftover bytes between socket reads so frames may span reads.

use crate::error::FrameError;
use bytes::{Buf, BytesMut};
use std::fmt;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest possible frame header: 2 + 8 byte length + 4 byte mask.
pub const MAX_HEADER_LEN: usize = 14;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation of a fragmented message
    Continuation = 0x0,
    /// UTF-8 text
    Text = 0x1,
    /// Binary data
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Decode the low nibble of the first frame byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Wire value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Control frames (close, ping, pong) are never fragmented.
    #[inline]
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x08 != 0
    }
}

/// Status code carried by a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000
    Normal,
    /// 1001
    GoingAway,
    /// 1002
    ProtocolError,
    /// 1003
    Unsupported,
    /// 1005, never sent on the wire
    NoStatus,
    /// 1006, never sent on the wire
    Abnormal,
    /// 1007
    InvalidPayload,
    /// 1008
    PolicyViolation,
    /// 1009
    MessageTooBig,
    /// 1010
    MandatoryExtension,
    /// 1011
    InternalError,
    /// Registered or application codes (3000-4999)
    Other(u16),
}

impl CloseCode {
    /// Numeric value.
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => code,
        }
    }

    /// Map a numeric value to a close code.
    pub fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Whether a peer may legally put this code in a close frame.
    pub fn is_sendable(self) -> bool {
        match self.as_u16() {
            1000..=1003 | 1007..=1014 => true,
            3000..=4999 => true,
            _ => false,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Build a close frame payload: 2-byte big-endian code followed by the reason.
///
/// Reasons are truncated on a character boundary so the payload stays within
/// the control frame limit.
pub fn close_payload(code: CloseCode, reason: &str) -> Vec<u8> {
    let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    let mut payload = Vec::with_capacity(2 + end);
    payload.extend_from_slice(&code.as_u16().to_be_bytes());
    payload.extend_from_slice(&reason.as_bytes()[..end]);
    payload
}

/// Parse a close frame payload.
///
/// An empty payload means the peer sent no status.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<(CloseCode, String)>, FrameError> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(FrameError::malformed("close payload of one byte")),
        _ => {
            let code = CloseCode::from_u16(u16::from_be_bytes([payload[0], payload[1]]));
            if !code.is_sendable() {
                return Err(FrameError::malformed(format!("invalid close code {}", code)));
            }
            let reason = std::str::from_utf8(&payload[2..])
                .map_err(|_| FrameError::malformed("close reason is not UTF-8"))?;
            Ok(Some((code, reason.to_string())))
        }
    }
}

/// Parsed fixed part of a frame, everything before the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment of a message
    pub fin: bool,
    /// Extension bit 1
    pub rsv1: bool,
    /// Extension bit 2
    pub rsv2: bool,
    /// Extension bit 3
    pub rsv3: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Masking key, present on client frames
    pub mask: Option<[u8; 4]>,
    /// Declared payload length
    pub payload_len: u64,
    /// Bytes taken by the header itself
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a header from the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        require(buf, 2)?;
        let b0 = buf[0];
        let b1 = buf[1];

        let opcode = OpCode::from_u8(b0 & 0x0F)
            .ok_or_else(|| FrameError::malformed(format!("reserved opcode {:#x}", b0 & 0x0F)))?;
        let fin = b0 & 0x80 != 0;
        let masked = b1 & 0x80 != 0;

        let mut offset = 2;
        let payload_len = match b1 & 0x7F {
            126 => {
                require(buf, offset + 2)?;
                let len = u16::from_be_bytes([buf[2], buf[3]]) as u64;
                offset += 2;
                len
            }
            127 => {
                require(buf, offset + 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(FrameError::malformed("64-bit length with most significant bit set"));
                }
                offset += 8;
                len
            }
            len => len as u64,
        };

        if opcode.is_control() {
            if !fin {
                return Err(FrameError::malformed("fragmented control frame"));
            }
            if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(FrameError::malformed("control frame payload over 125 bytes"));
            }
        }

        let mask = if masked {
            require(buf, offset + 4)?;
            let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(key)
        } else {
            None
        };

        Ok(Self {
            fin,
            rsv1: b0 & 0x40 != 0,
            rsv2: b0 & 0x20 != 0,
            rsv3: b0 & 0x10 != 0,
            opcode,
            mask,
            payload_len,
            header_len: offset,
        })
    }
}

#[inline]
fn require(buf: &[u8], total: usize) -> Result<(), FrameError> {
    if buf.len() < total {
        Err(FrameError::Incomplete {
            needed: total - buf.len(),
        })
    } else {
        Ok(())
    }
}

/// XOR `payload` with the repeating 4-byte key. Applying it twice restores the input.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// A single WebSocket frame. `payload` is always stored unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message
    pub fin: bool,
    /// Extension bit 1
    pub rsv1: bool,
    /// Extension bit 2
    pub rsv2: bool,
    /// Extension bit 3
    pub rsv3: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Masking key applied on encode
    pub mask: Option<[u8; 4]>,
    /// Application data
    pub payload: Vec<u8>,
}

impl Frame {
    /// Final, unmasked frame with no reserved bits.
    pub fn new(opcode: OpCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Final text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OpCode::Text, text.into().into_bytes())
    }

    /// Final binary frame.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Binary, data)
    }

    /// Ping frame.
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Ping, data)
    }

    /// Pong frame.
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Pong, data)
    }

    /// Close frame with a status code and reason.
    pub fn close(code: CloseCode, reason: &str) -> Self {
        Self::new(OpCode::Close, close_payload(code, reason))
    }

    /// Set the FIN bit.
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Mask the frame with `key` when encoded. Clients must mask every frame.
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Whether a masking key is set.
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Number of bytes `encode` will produce.
    pub fn encoded_len(&self) -> usize {
        let len = self.payload.len();
        let ext = if len < 126 {
            0
        } else if len <= u16::MAX as usize {
            2
        } else {
            8
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + ext + mask + len
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Append wire bytes to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= 0x80;
        }
        if self.rsv1 {
            b0 |= 0x40;
        }
        if self.rsv2 {
            b0 |= 0x20;
        }
        if self.rsv3 {
            b0 |= 0x10;
        }
        out.push(b0);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };
        let len = self.payload.len();
        if len < 126 {
            out.push(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        match self.mask {
            Some(key) => {
                out.extend_from_slice(&key);
                let start = out.len();
                out.extend_from_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.extend_from_slice(&self.payload),
        }
    }

    /// Decode one frame from the start of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        let header = FrameHeader::parse(buf)?;
        let payload_len = usize::try_from(header.payload_len)
            .map_err(|_| FrameError::malformed("payload length exceeds address space"))?;
        let end = header
            .header_len
            .checked_add(payload_len)
            .ok_or_else(|| FrameError::malformed("payload length overflow"))?;
        require(buf, end)?;

        let mut payload = buf[header.header_len..end].to_vec();
        if let Some(key) = header.mask {
            apply_mask(&mut payload, key);
        }

        let frame = Self {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            mask: header.mask,
            payload,
        };
        Ok((frame, end))
    }
}

/// Incremental decoder that buffers partial frames across reads.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder rejecting frames larger than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame_size,
        }
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame.
    ///
    /// `Ok(None)` means the buffered bytes do not hold a complete frame yet.
    /// Frames declaring a payload larger than `max_frame_size` are rejected
    /// as soon as their header arrives.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let header = match FrameHeader::parse(&self.buf) {
            Ok(header) => header,
            Err(FrameError::Incomplete { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if header.payload_len > self.max_frame_size as u64 {
            return Err(FrameError::malformed(format!(
                "frame payload of {} bytes exceeds limit of {}",
                header.payload_len, self.max_frame_size
            )));
        }

        match Frame::decode(&self.buf) {
            Ok((frame, used)) => {
                self.buf.advance(used);
                Ok(Some(frame))
            }
            Err(FrameError::Incomplete { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
