//! String fields
//!
//! Variable strings carry an obfuscated length header (`units + 1`), the
//! character data, a terminator and alignment padding:
//! - ASCII: `4 - len % 4` zero bytes, so data plus padding is 4-aligned
//! - UTF-16LE: one zero unit, plus one more when `len + 1` is odd
//!
//! An empty string is just the header with value 0.
//!
//! Fixed strings have no header: exactly `char_count` units, truncated or
//! zero padded. UTF-16 truncation counts code units, so it can split a
//! surrogate pair; the dangling half reads back as U+FFFD.

use super::buffer::{PacketReader, PacketWriter};
use super::codec::{CodecError, CodecResult};

/// Character encoding of a string field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    /// One byte per character, non-ASCII replaced by `?`
    Ascii,
    /// UTF-16 little-endian
    Utf16,
}

impl StringEncoding {
    /// Bytes per unit
    pub fn unit_width(self) -> usize {
        match self {
            StringEncoding::Ascii => 1,
            StringEncoding::Utf16 => 2,
        }
    }
}

fn ascii_units(text: &str) -> impl Iterator<Item = u8> + '_ {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
}

fn ascii_padding(len: usize) -> usize {
    4 - (len & 3)
}

impl PacketWriter {
    /// Write a header-prefixed string in the given encoding
    pub fn write_string(&mut self, text: &str, xor: u32, sub: u32, encoding: StringEncoding) {
        match encoding {
            StringEncoding::Ascii => self.write_ascii(text, xor, sub),
            StringEncoding::Utf16 => self.write_utf16(text, xor, sub),
        }
    }

    pub fn write_ascii(&mut self, text: &str, xor: u32, sub: u32) {
        if text.is_empty() {
            self.write_magic(0, xor, sub);
            return;
        }

        let units: Vec<u8> = ascii_units(text).collect();
        self.write_magic(units.len() as u32 + 1, xor, sub);
        self.write_bytes(&units);
        // terminator is the first padding byte
        self.write_zeros(ascii_padding(units.len()));
    }

    pub fn write_utf16(&mut self, text: &str, xor: u32, sub: u32) {
        if text.is_empty() {
            self.write_magic(0, xor, sub);
            return;
        }

        let units: Vec<u16> = text.encode_utf16().collect();
        let char_count = units.len() as u32 + 1;
        self.write_magic(char_count, xor, sub);
        for unit in &units {
            self.write_u16(*unit);
        }
        self.write_u16(0);
        if char_count & 1 != 0 {
            self.write_u16(0);
        }
    }

    /// Write exactly `char_count` units, truncating silently
    pub fn write_fixed_string(&mut self, text: &str, char_count: usize, encoding: StringEncoding) {
        match encoding {
            StringEncoding::Ascii => self.write_fixed_ascii(text, char_count),
            StringEncoding::Utf16 => self.write_fixed_utf16(text, char_count),
        }
    }

    pub fn write_fixed_ascii(&mut self, text: &str, char_count: usize) {
        let mut written = 0;
        for unit in ascii_units(text).take(char_count) {
            self.write_u8(unit);
            written += 1;
        }
        self.write_zeros(char_count - written);
    }

    /// Truncates per code unit and may leave half a surrogate pair
    pub fn write_fixed_utf16(&mut self, text: &str, char_count: usize) {
        let mut written = 0;
        for unit in text.encode_utf16().take(char_count) {
            self.write_u16(unit);
            written += 1;
        }
        self.write_zeros((char_count - written) * 2);
    }
}

impl PacketReader<'_> {
    /// Read a header-prefixed string in the given encoding
    pub fn read_string(&mut self, xor: u32, sub: u32, encoding: StringEncoding) -> CodecResult<String> {
        match encoding {
            StringEncoding::Ascii => self.read_ascii(xor, sub),
            StringEncoding::Utf16 => self.read_utf16(xor, sub),
        }
    }

    pub fn read_ascii(&mut self, xor: u32, sub: u32) -> CodecResult<String> {
        let char_count = self.read_magic(xor, sub)? as usize;
        if char_count == 0 {
            return Ok(String::new());
        }

        let len = char_count - 1;
        let declared = len
            .checked_add(ascii_padding(len))
            .ok_or(CodecError::MalformedLength {
                declared: usize::MAX,
                available: self.remaining(),
            })?;
        self.check_declared(declared)?;

        let data = self.read_bytes(declared)?;
        Ok(data[..len].iter().map(|&b| b as char).collect())
    }

    pub fn read_utf16(&mut self, xor: u32, sub: u32) -> CodecResult<String> {
        let char_count = self.read_magic(xor, sub)? as usize;
        if char_count == 0 {
            return Ok(String::new());
        }

        let total_units = char_count + (char_count & 1);
        let declared = total_units
            .checked_mul(2)
            .ok_or(CodecError::MalformedLength {
                declared: usize::MAX,
                available: self.remaining(),
            })?;
        self.check_declared(declared)?;

        let data = self.read_bytes(declared)?;
        let units: Vec<u16> = data
            .chunks_exact(2)
            .take(char_count - 1)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Read exactly `char_count` units and trim trailing zero units
    pub fn read_fixed_string(&mut self, char_count: usize, encoding: StringEncoding) -> CodecResult<String> {
        let needed = char_count
            .checked_mul(encoding.unit_width())
            .ok_or(CodecError::Truncated {
                needed: usize::MAX,
                remaining: self.remaining(),
            })?;
        let data = self.read_bytes(needed)?;

        match encoding {
            StringEncoding::Ascii => {
                let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                Ok(data[..end].iter().map(|&b| b as char).collect())
            }
            StringEncoding::Utf16 => {
                let mut units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                while units.last() == Some(&0) {
                    units.pop();
                }
                Ok(String::from_utf16_lossy(&units))
            }
        }
    }

    fn check_declared(&self, declared: usize) -> CodecResult<()> {
        if declared > self.remaining() {
            return Err(CodecError::MalformedLength {
                declared,
                available: self.remaining(),
            });
        }
        Ok(())
    }
}
