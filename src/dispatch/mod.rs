//! Dispatch module - Routes inbound packets to their handlers
//!
//! Provides:
//! - The immutable opcode table and the handler trait
//! - Movement relay handlers and their broadcast policies
//! - Counters for handled, unknown and dropped packets

mod movement;
mod stats;
mod table;

pub use movement::*;
pub use stats::*;
pub use table::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::network::ConnectionError;
use crate::protocol::{opcodes, CodecError};

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Handler already registered for {major:#04x}-{minor:#04x}")]
    DuplicateHandler { major: u8, minor: u8 },

    #[error("Malformed packet: {len} bytes, at least {required} required")]
    MalformedPacket { len: usize, required: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatch table configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Inbound `[major, minor]` routed to the broadcast-all movement relay
    pub movement_event_opcode: Option<[u8; 2]>,
    /// Log unknown opcodes at info instead of debug
    #[serde(default)]
    pub log_unknown_opcodes: bool,
}

/// Register the movement relays
///
/// Movement and movement-end share one exclude-sender relay. The
/// broadcast-all relay is only routed when `event_opcode` is given.
pub fn register_movement_handlers(
    builder: &mut DispatchTableBuilder,
    event_opcode: Option<(u8, u8)>,
) -> DispatchResult<()> {
    let relay: Arc<dyn PacketHandler> = Arc::new(MovementRelay::exclude_sender());
    let (major, minor) = opcodes::MOVEMENT;
    builder.register_shared(major, minor, relay.clone())?;
    let (major, minor) = opcodes::MOVEMENT_END;
    builder.register_shared(major, minor, relay)?;

    if let Some((major, minor)) = event_opcode {
        builder.register(major, minor, MovementRelay::broadcast_all())?;
    }
    Ok(())
}

/// Build the server's table from configuration
pub fn default_table(config: &DispatchConfig) -> DispatchResult<DispatchTable> {
    let mut builder = DispatchTable::builder();
    builder.log_unknown_opcodes(config.log_unknown_opcodes);

    let event_opcode = config.movement_event_opcode.map(|[major, minor]| (major, minor));
    register_movement_handlers(&mut builder, event_opcode)?;

    let table = builder.build();
    tracing::info!("Dispatch table ready with {} handlers", table.len());
    Ok(table)
}
