//! Packet frame codec
//!
//! Builds and validates the 8-byte frame header around one delivered
//! packet. The transport hands over exactly one frame per buffer, so no
//! stream reassembly happens here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Default upper bound on a single frame (1 MiB)
pub const DEFAULT_MAX_PACKET_SIZE: usize = 0x10_0000;

/// Header size: size(4) + major(1) + minor(1) + flags(1) + flags2(1) = 8 bytes
pub const HEADER_SIZE: usize = 8;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated buffer: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Malformed length: declared {declared} bytes, {available} available")]
    MalformedLength { declared: usize, available: usize },

    #[error("Layout unsupported for {type_name}: expected {expected} bytes, encoder wrote {actual}")]
    LayoutUnsupported {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// One packet: opcode pair, family flags and an owned payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub major: u8,
    pub minor: u8,
    pub flags: u8,
    pub flags2: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(major: u8, minor: u8, flags: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            major,
            minor,
            flags,
            flags2: 0,
            payload: payload.into(),
        }
    }

    /// The `(major, minor)` routing key
    pub fn opcode(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    /// Total frame length on the wire
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode the full frame into `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.wire_len());
        buf.put_u32_le(self.wire_len() as u32);
        buf.put_u8(self.major);
        buf.put_u8(self.minor);
        buf.put_u8(self.flags);
        buf.put_u8(self.flags2);
        buf.put_slice(&self.payload);
    }

    /// Encode into a fresh contiguous buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Validate and split one delivered frame
    ///
    /// The declared size must match the buffer exactly and stay within
    /// `max_size`.
    pub fn from_bytes(data: &[u8], max_size: usize) -> CodecResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: HEADER_SIZE,
                remaining: data.len(),
            });
        }

        let mut header = &data[..HEADER_SIZE];
        let declared = header.get_u32_le() as usize;

        if declared < HEADER_SIZE || declared > max_size || declared != data.len() {
            return Err(CodecError::MalformedLength {
                declared,
                available: data.len().min(max_size),
            });
        }

        let major = header.get_u8();
        let minor = header.get_u8();
        let flags = header.get_u8();
        let flags2 = header.get_u8();

        Ok(Self {
            major,
            minor,
            flags,
            flags2,
            payload: Bytes::copy_from_slice(&data[HEADER_SIZE..]),
        })
    }
}
