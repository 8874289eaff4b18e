//! Fixed-layout wire records
//!
//! Each record spells out its fields in wire order. The declared
//! [`WireRecord::WIRE_SIZE`] is part of the protocol and checked on every
//! write and read.

use super::buffer::{PacketReader, PacketWriter};
use super::codec::{CodecError, CodecResult};
use super::PLAYER_HEADER_TAG;

/// A record with a fixed byte layout on the wire
pub trait WireRecord: Sized {
    /// Exact encoded size in bytes
    const WIRE_SIZE: usize;

    fn encode(&self, writer: &mut PacketWriter);

    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self>;
}

impl PacketWriter {
    /// Append a fixed-layout record
    ///
    /// An encoder that does not write exactly `WIRE_SIZE` bytes is rejected
    /// and its partial output removed.
    pub fn write_struct<T: WireRecord>(&mut self, value: &T) -> CodecResult<()> {
        let start = self.len();
        value.encode(self);
        let actual = self.len() - start;

        if actual != T::WIRE_SIZE {
            self.rollback(start);
            return Err(CodecError::LayoutUnsupported {
                type_name: std::any::type_name::<T>(),
                expected: T::WIRE_SIZE,
                actual,
            });
        }
        Ok(())
    }

    pub fn write_position(&mut self, position: &Position) {
        position.encode(self);
    }

    pub fn write_player_header(&mut self, id: u32) {
        PlayerHeader::new(id).encode(self);
    }
}

impl PacketReader<'_> {
    /// Read a fixed-layout record, failing up front if it cannot fit
    ///
    /// The cursor is rewound when decoding fails or consumes anything other
    /// than `WIRE_SIZE` bytes.
    pub fn read_struct<T: WireRecord>(&mut self) -> CodecResult<T> {
        if self.remaining() < T::WIRE_SIZE {
            return Err(CodecError::Truncated {
                needed: T::WIRE_SIZE,
                remaining: self.remaining(),
            });
        }

        let checkpoint = self.clone();
        let start = self.position();
        let value = match T::decode(self) {
            Ok(value) => value,
            Err(e) => {
                *self = checkpoint;
                return Err(e);
            }
        };
        let actual = self.position() - start;

        if actual != T::WIRE_SIZE {
            *self = checkpoint;
            return Err(CodecError::LayoutUnsupported {
                type_name: std::any::type_name::<T>(),
                expected: T::WIRE_SIZE,
                actual,
            });
        }
        Ok(value)
    }

    pub fn read_position(&mut self) -> CodecResult<Position> {
        self.read_struct()
    }

    pub fn read_player_header(&mut self) -> CodecResult<PlayerHeader> {
        self.read_struct()
    }
}

/// Orientation and world position, each field sent as a half float
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    /// Orientation components
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub facing_angle: f32,
    /// World coordinates
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(a: f32, b: f32, c: f32, facing_angle: f32, x: f32, y: f32, z: f32) -> Self {
        Self {
            a,
            b,
            c,
            facing_angle,
            x,
            y,
            z,
        }
    }
}

impl WireRecord for Position {
    const WIRE_SIZE: usize = 14;

    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_half(self.a);
        writer.write_half(self.b);
        writer.write_half(self.c);
        writer.write_half(self.facing_angle);
        writer.write_half(self.x);
        writer.write_half(self.y);
        writer.write_half(self.z);
    }

    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            a: reader.read_half()?,
            b: reader.read_half()?,
            c: reader.read_half()?,
            facing_angle: reader.read_half()?,
            x: reader.read_half()?,
            y: reader.read_half()?,
            z: reader.read_half()?,
        })
    }
}

/// Identifies a player inside another packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerHeader {
    pub id: u32,
    pub reserved: u32,
    pub tag: u16,
    pub reserved2: u16,
}

impl PlayerHeader {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            reserved: 0,
            tag: PLAYER_HEADER_TAG,
            reserved2: 0,
        }
    }
}

impl WireRecord for PlayerHeader {
    const WIRE_SIZE: usize = 12;

    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_u32(self.id);
        writer.write_u32(self.reserved);
        writer.write_u16(self.tag);
        writer.write_u16(self.reserved2);
    }

    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            id: reader.read_u32()?,
            reserved: reader.read_u32()?,
            tag: reader.read_u16()?,
            reserved2: reader.read_u16()?,
        })
    }
}
