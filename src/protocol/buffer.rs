//! Packet buffers
//!
//! [`PacketWriter`] appends little-endian fields to a growable buffer.
//! [`PacketReader`] walks a borrowed slice and refuses to read past its end.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codec::{CodecError, CodecResult};
use super::scalar::{decode_half, decode_header, encode_half, encode_header};

/// Append-only packet payload builder
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append `count` zero bytes
    pub fn write_zeros(&mut self, count: usize) {
        self.buf.put_bytes(0, count);
    }

    /// Obfuscated 32-bit header, see [`encode_header`]
    pub fn write_magic(&mut self, value: u32, xor: u32, sub: u32) {
        self.write_u32(encode_header(value, xor, sub));
    }

    /// `f32` narrowed to half precision
    pub fn write_half(&mut self, value: f32) {
        self.write_u16(encode_half(value));
    }

    /// Drop everything written after `len`
    pub(crate) fn rollback(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// Copy of the finished payload, the writer stays usable
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Finish the payload
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Bounds-checked cursor over a received payload
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    total: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            total: data.len(),
        }
    }

    /// Current offset from the start of the payload
    pub fn position(&self) -> usize {
        self.total - self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn ensure(&self, needed: usize) -> CodecResult<()> {
        if needed > self.data.len() {
            return Err(CodecError::Truncated {
                needed,
                remaining: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.ensure(2)?;
        Ok(self.data.get_u16_le())
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.ensure(4)?;
        Ok(self.data.get_u32_le())
    }

    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.ensure(4)?;
        Ok(self.data.get_f32_le())
    }

    /// Borrow the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    pub fn skip(&mut self, len: usize) -> CodecResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Read and de-obfuscate a 32-bit header
    pub fn read_magic(&mut self, xor: u32, sub: u32) -> CodecResult<u32> {
        Ok(decode_header(self.read_u32()?, xor, sub))
    }

    pub fn read_half(&mut self) -> CodecResult<f32> {
        Ok(decode_half(self.read_u16()?))
    }

    /// Everything not consumed yet
    pub fn rest(&self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_little_endian() {
        let mut writer = PacketWriter::new();
        writer.write_u8(0xAB);
        writer.write_u16(0x0102);
        writer.write_u32(0x0A0B_0C0D);
        writer.write_zeros(2);

        assert_eq!(
            writer.as_slice(),
            &[0xAB, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A, 0x00, 0x00]
        );
        assert_eq!(writer.len(), 9);
        assert_eq!(writer.to_bytes(), writer.clone().into_bytes());
    }

    #[test]
    fn test_reader_advances() {
        let data = [0xAB, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A, 0xFF];
        let mut reader = PacketReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert_eq!(reader.position(), 3);
        assert_eq!(reader.read_u32().unwrap(), 0x0A0B_0C0D);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.rest(), &[0xFF]);
    }

    #[test]
    fn test_reader_refuses_overrun() {
        let data = [1u8, 2, 3];
        let mut reader = PacketReader::new(&data);

        assert_eq!(
            reader.read_u32(),
            Err(CodecError::Truncated { needed: 4, remaining: 3 })
        );
        // a failed read leaves the cursor untouched
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert!(reader.is_empty());
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_magic_and_half() {
        let mut writer = PacketWriter::new();
        writer.write_magic(7, 0x8BA4, 0xB6);
        writer.write_half(1.5);

        let bytes = writer.into_bytes();
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_magic(0x8BA4, 0xB6).unwrap(), 7);
        assert_eq!(reader.read_half().unwrap(), 1.5);
    }
}
