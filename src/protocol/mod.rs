//! Protocol module - Defines the wire format spoken between server and clients
//!
//! Every delivered packet is one little-endian frame:
//! - 4 bytes total size (header included)
//! - 1 byte major opcode
//! - 1 byte minor opcode
//! - 1 byte flags (family discriminator)
//! - 1 byte secondary flags
//! - Variable length payload
//!
//! Payload fields are built from the primitives in this module: obfuscated
//! headers, half-precision floats, length-prefixed strings and fixed-layout
//! records.

mod buffer;
mod codec;
mod record;
mod scalar;
mod strings;

pub use buffer::*;
pub use codec::*;
pub use record::*;
pub use scalar::*;
pub use strings::*;

/// Opcode pairs and tags used by the relay handlers
pub mod opcodes {
    /// Movement family
    pub const MOVEMENT_MAJOR: u8 = 0x04;

    /// Inbound movement update
    pub const MOVEMENT: (u8, u8) = (MOVEMENT_MAJOR, 0x04);
    /// Inbound movement end, same relay as `MOVEMENT`
    pub const MOVEMENT_END: (u8, u8) = (MOVEMENT_MAJOR, 0x71);

    /// Outgoing relay to every other loaded player
    pub const RELAY_MINOR: u8 = 0x71;
    pub const RELAY_FLAGS: u8 = 0x40;

    /// Outgoing relay to every loaded player, sender included
    pub const BROADCAST_MINOR: u8 = 0x80;
    pub const BROADCAST_FLAGS: u8 = 0x44;
}

/// Tag written into every player header record
pub const PLAYER_HEADER_TAG: u16 = 4;
