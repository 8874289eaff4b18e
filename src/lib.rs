//! arksnet - Game server wire protocol
//!
//! Packet codec primitives, the opcode dispatch table and the movement
//! relay policies. Socket handling and game state live elsewhere; this
//! crate sees one delivered frame at a time and a registry of connection
//! handles.

pub mod config;
pub mod dispatch;
pub mod network;
pub mod protocol;

pub use dispatch::{DispatchOutcome, DispatchTable, DispatchTableBuilder, PacketHandler};
pub use network::{ConnectionHandle, ConnectionRegistry};
pub use protocol::{Packet, PacketReader, PacketWriter};
