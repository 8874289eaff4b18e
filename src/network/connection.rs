//! Connection handles
//!
//! A [`ConnectionHandle`] is the server-side view of one client:
//! - Identity (connection id, player id)
//! - Whether an in-world character is loaded
//! - A bounded outbound queue, drained by exactly one writer task

use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::protocol::Packet;

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    Closed,

    #[error("Send queue full for connection {0}")]
    QueueFull(ConnectionId),

    #[error("Send channel closed")]
    SendChannelClosed,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Registry-assigned connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiving end of a connection's outbound queue
pub type Outbound = mpsc::Receiver<Packet>;

/// Outside the `u32` range, so every character id is representable
const NO_CHARACTER: u64 = u64::MAX;

/// A handle for sending packets to a connection
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    player_id: u32,
    sender: mpsc::Sender<Packet>,
    connected: Arc<AtomicBool>,
    character_id: Arc<AtomicU64>,
}

impl ConnectionHandle {
    /// Create a handle and the queue its writer task drains
    pub fn new(id: ConnectionId, player_id: u32, queue_capacity: usize) -> (Self, Outbound) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id,
            player_id,
            sender,
            connected: Arc::new(AtomicBool::new(true)),
            character_id: Arc::new(AtomicU64::new(NO_CHARACTER)),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Canonical player identifier, patched into relayed packets
    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    /// Whether the player has an in-world character loaded
    pub fn has_character(&self) -> bool {
        self.character_id.load(Ordering::SeqCst) != NO_CHARACTER
    }

    pub fn character_id(&self) -> Option<u32> {
        match self.character_id.load(Ordering::SeqCst) {
            NO_CHARACTER => None,
            id => Some(id as u32),
        }
    }

    /// Attach a loaded character, or detach with `None`
    pub fn set_character(&self, character_id: Option<u32>) {
        self.character_id
            .store(character_id.map_or(NO_CHARACTER, u64::from), Ordering::SeqCst);
    }

    /// Queue a packet without waiting
    ///
    /// Fails when the peer is gone or its queue is full; the caller decides
    /// whether that matters.
    pub fn send(&self, packet: Packet) -> ConnectionResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }

        self.sender.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => ConnectionError::SendChannelClosed,
        })
    }

    /// Build and queue a packet from its parts
    pub fn send_packet(
        &self,
        major: u8,
        minor: u8,
        flags: u8,
        payload: bytes::Bytes,
    ) -> ConnectionResult<()> {
        self.send(Packet::new(major, minor, flags, payload))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    /// Mark the connection as disconnected
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Connection statistics
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Packets written to the sink
    pub packets_sent: AtomicU64,
    /// Bytes written to the sink
    pub bytes_sent: AtomicU64,
}

impl ConnectionStats {
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Write queued packets to `sink` until every sender is dropped
///
/// Runs as the single writer for one connection, so frames never
/// interleave.
pub async fn drain_outbound<W>(
    mut outbound: Outbound,
    mut sink: W,
    stats: Arc<ConnectionStats>,
) -> ConnectionResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut write_buf = BytesMut::with_capacity(4096);

    while let Some(packet) = outbound.recv().await {
        write_buf.clear();
        packet.encode(&mut write_buf);

        sink.write_all(&write_buf).await?;
        sink.flush().await?;

        stats.packets_sent.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes_sent
            .fetch_add(write_buf.len() as u64, Ordering::Relaxed);

        tracing::trace!(
            "Wrote {:#04x}-{:#04x} ({} bytes)",
            packet.major,
            packet.minor,
            write_buf.len()
        );
    }

    Ok(())
}
