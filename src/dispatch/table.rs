//! Opcode dispatch table
//!
//! Built once at startup through [`DispatchTableBuilder`], then shared
//! read-only by every connection task. No locking on the hot path.

use bytes::BytesMut;
use std::collections::HashMap;
use std::sync::Arc;

use super::stats::DispatchStats;
use super::{DispatchError, DispatchResult};
use crate::network::{ConnectionHandle, ConnectionRegistry};
use crate::protocol::Packet;

/// What a handler can reach while processing one packet
pub struct HandlerContext<'a> {
    /// Connection the packet came from
    pub sender: &'a ConnectionHandle,
    /// Every connected client
    pub registry: &'a ConnectionRegistry,
    pub stats: &'a DispatchStats,
}

/// Processes one inbound opcode pair
///
/// The handler owns `payload` and may patch it before relaying.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_>, payload: BytesMut) -> DispatchResult<()>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> PacketHandler for F
where
    F: Fn(&HandlerContext<'_>, BytesMut) -> DispatchResult<()> + Send + Sync,
{
    fn handle(&self, ctx: &HandlerContext<'_>, payload: BytesMut) -> DispatchResult<()> {
        self(ctx, payload)
    }
}

/// Result of dispatching one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler accepted the packet
    Handled,
    /// No handler for the opcode pair, nothing happened
    UnknownOpcode,
    /// The packet failed to decode or the handler rejected it
    Dropped,
}

/// Collects handlers before the table is frozen
#[derive(Default)]
pub struct DispatchTableBuilder {
    handlers: HashMap<(u8, u8), Arc<dyn PacketHandler>>,
    log_unknown: bool,
}

impl DispatchTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `(major, minor)`
    ///
    /// A pair can only be registered once.
    pub fn register<H>(&mut self, major: u8, minor: u8, handler: H) -> DispatchResult<&mut Self>
    where
        H: PacketHandler + 'static,
    {
        self.register_shared(major, minor, Arc::new(handler))
    }

    /// Register one handler instance under another opcode pair
    pub fn register_shared(
        &mut self,
        major: u8,
        minor: u8,
        handler: Arc<dyn PacketHandler>,
    ) -> DispatchResult<&mut Self> {
        if self.handlers.contains_key(&(major, minor)) {
            return Err(DispatchError::DuplicateHandler { major, minor });
        }

        tracing::debug!(
            "Registered {:#04x}-{:#04x} -> {}",
            major,
            minor,
            handler.name()
        );
        self.handlers.insert((major, minor), handler);
        Ok(self)
    }

    /// Log unknown opcodes at info instead of debug
    pub fn log_unknown_opcodes(&mut self, enabled: bool) -> &mut Self {
        self.log_unknown = enabled;
        self
    }

    pub fn build(self) -> DispatchTable {
        DispatchTable {
            handlers: self.handlers,
            stats: Arc::new(DispatchStats::new()),
            log_unknown: self.log_unknown,
        }
    }
}

/// Immutable `(major, minor) -> handler` routing
pub struct DispatchTable {
    handlers: HashMap<(u8, u8), Arc<dyn PacketHandler>>,
    stats: Arc<DispatchStats>,
    log_unknown: bool,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::new()
    }

    /// Route one payload to its handler
    ///
    /// Never fails: unknown opcodes and handler errors are counted, logged
    /// and contained to this packet.
    pub fn dispatch(
        &self,
        registry: &ConnectionRegistry,
        sender: &ConnectionHandle,
        major: u8,
        minor: u8,
        payload: BytesMut,
    ) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&(major, minor)) else {
            self.stats.record_unknown();
            if self.log_unknown {
                tracing::info!(
                    "Unknown opcode {:#04x}-{:#04x} from {} ({} bytes)",
                    major,
                    minor,
                    sender.id(),
                    payload.len()
                );
            } else {
                tracing::debug!(
                    "Unknown opcode {:#04x}-{:#04x} from {} ({} bytes)",
                    major,
                    minor,
                    sender.id(),
                    payload.len()
                );
            }
            return DispatchOutcome::UnknownOpcode;
        };

        let ctx = HandlerContext {
            sender,
            registry,
            stats: &self.stats,
        };

        match handler.handle(&ctx, payload) {
            Ok(()) => {
                self.stats.record_handled();
                DispatchOutcome::Handled
            }
            Err(e) => {
                self.stats.record_dropped();
                tracing::warn!(
                    "Dropped {:#04x}-{:#04x} from {}: {}",
                    major,
                    minor,
                    sender.id(),
                    e
                );
                DispatchOutcome::Dropped
            }
        }
    }

    /// Dispatch a decoded packet; the handler gets its own payload copy
    pub fn dispatch_packet(
        &self,
        registry: &ConnectionRegistry,
        sender: &ConnectionHandle,
        packet: &Packet,
    ) -> DispatchOutcome {
        self.dispatch(
            registry,
            sender,
            packet.major,
            packet.minor,
            BytesMut::from(packet.payload.as_ref()),
        )
    }

    /// Decode one delivered frame and dispatch it
    pub fn dispatch_frame(
        &self,
        registry: &ConnectionRegistry,
        sender: &ConnectionHandle,
        frame: &[u8],
        max_packet_size: usize,
    ) -> DispatchOutcome {
        match Packet::from_bytes(frame, max_packet_size) {
            Ok(packet) => self.dispatch_packet(registry, sender, &packet),
            Err(e) => {
                self.stats.record_dropped();
                tracing::warn!("Dropped frame from {}: {}", sender.id(), e);
                DispatchOutcome::Dropped
            }
        }
    }

    pub fn contains(&self, major: u8, minor: u8) -> bool {
        self.handlers.contains_key(&(major, minor))
    }

    /// Registered pairs with their handler names, sorted
    pub fn entries(&self) -> Vec<((u8, u8), &'static str)> {
        let mut entries: Vec<_> = self
            .handlers
            .iter()
            .map(|(opcode, handler)| (*opcode, handler.name()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}
