//! Movement relay
//!
//! Movement packets start with the mover's player id. The server stamps the
//! sender's canonical id over the first 4 bytes, then forwards the payload
//! to the players who can see it:
//! - [`RelayPolicy::EXCLUDE_SENDER`]: every other loaded player, `0x04-0x71` tag `0x40`
//! - [`RelayPolicy::BROADCAST_ALL`]: every loaded player, sender included, `0x04-0x80` tag `0x44`
//!
//! Connections without a loaded character never receive relays.

use bytes::{Bytes, BytesMut};

use super::table::{HandlerContext, PacketHandler};
use super::{DispatchError, DispatchResult};
use crate::network::ConnectionHandle;
use crate::protocol::{opcodes, Packet};

/// Bytes overwritten with the sender's player id
pub const PLAYER_ID_LEN: usize = 4;

/// Who receives a relayed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayScope {
    /// Every loaded player except the sender
    ExcludeSender,
    /// Every loaded player including the sender
    Everyone,
}

/// Recipient filter plus the outgoing opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    pub scope: RelayScope,
    pub major: u8,
    pub minor: u8,
    pub flags: u8,
}

/// Copies queued and refused during one relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

impl RelayPolicy {
    pub const EXCLUDE_SENDER: RelayPolicy = RelayPolicy {
        scope: RelayScope::ExcludeSender,
        major: opcodes::MOVEMENT_MAJOR,
        minor: opcodes::RELAY_MINOR,
        flags: opcodes::RELAY_FLAGS,
    };

    pub const BROADCAST_ALL: RelayPolicy = RelayPolicy {
        scope: RelayScope::Everyone,
        major: opcodes::MOVEMENT_MAJOR,
        minor: opcodes::BROADCAST_MINOR,
        flags: opcodes::BROADCAST_FLAGS,
    };

    /// Whether `candidate` gets a copy of a packet from `sender`
    pub fn accepts(&self, sender: &ConnectionHandle, candidate: &ConnectionHandle) -> bool {
        if !candidate.has_character() {
            return false;
        }
        match self.scope {
            RelayScope::ExcludeSender => candidate.id() != sender.id(),
            RelayScope::Everyone => true,
        }
    }

    /// Send `payload` to every accepted connection in `connections`
    ///
    /// A refused send is logged and skipped; the fan-out always finishes.
    pub fn relay(
        &self,
        sender: &ConnectionHandle,
        connections: &[ConnectionHandle],
        payload: Bytes,
    ) -> RelayReport {
        let mut report = RelayReport::default();

        for recipient in connections.iter().filter(|c| self.accepts(sender, c)) {
            let packet = Packet::new(self.major, self.minor, self.flags, payload.clone());
            match recipient.send(packet) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Relay {:#04x}-{:#04x} to {} failed: {}",
                        self.major,
                        self.minor,
                        recipient.id(),
                        e
                    );
                }
            }
        }

        report
    }
}

/// Overwrite the first 4 bytes with `player_id` (little-endian)
///
/// Rejects payloads too short to hold the id without touching them.
pub fn patch_player_id(payload: &mut [u8], player_id: u32) -> DispatchResult<()> {
    if payload.len() < PLAYER_ID_LEN {
        return Err(DispatchError::MalformedPacket {
            len: payload.len(),
            required: PLAYER_ID_LEN,
        });
    }
    payload[..PLAYER_ID_LEN].copy_from_slice(&player_id.to_le_bytes());
    Ok(())
}

/// Stamps the sender's id on a movement payload and relays it
#[derive(Debug, Clone, Copy)]
pub struct MovementRelay {
    policy: RelayPolicy,
}

impl MovementRelay {
    /// Movement and movement-end: everyone else sees it
    pub fn exclude_sender() -> Self {
        Self {
            policy: RelayPolicy::EXCLUDE_SENDER,
        }
    }

    /// Movement events: everyone sees it, the sender too
    pub fn broadcast_all() -> Self {
        Self {
            policy: RelayPolicy::BROADCAST_ALL,
        }
    }
}

impl PacketHandler for MovementRelay {
    fn handle(&self, ctx: &HandlerContext<'_>, mut payload: BytesMut) -> DispatchResult<()> {
        patch_player_id(&mut payload, ctx.sender.player_id())?;

        let connections = ctx.registry.all_connections();
        let report = self
            .policy
            .relay(ctx.sender, &connections, payload.freeze());
        ctx.stats.record_relay(report.delivered, report.failed);

        tracing::trace!(
            "Movement from player {} relayed to {} ({} failed)",
            ctx.sender.player_id(),
            report.delivered,
            report.failed
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.policy.scope {
            RelayScope::ExcludeSender => "movement-relay",
            RelayScope::Everyone => "movement-event-broadcast",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchOutcome, DispatchTable};
    use crate::network::{ConnectionRegistry, NetworkConfig, Outbound};

    const PLAYER_A: u32 = 0xA0A0_0001;

    struct Scenario {
        registry: ConnectionRegistry,
        a: ConnectionHandle,
        rx_a: Outbound,
        rx_b: Outbound,
        rx_c: Outbound,
    }

    /// A sends, B has no character, C has one
    fn scenario() -> Scenario {
        let registry = ConnectionRegistry::default();
        let (a, rx_a) = registry.connect(PLAYER_A);
        let (_b, rx_b) = registry.connect(0xB0B0_0002);
        let (c, rx_c) = registry.connect(0xC0C0_0003);
        a.set_character(Some(1));
        c.set_character(Some(3));

        Scenario {
            registry,
            a,
            rx_a,
            rx_b,
            rx_c,
        }
    }

    fn table(event_opcode: (u8, u8)) -> DispatchTable {
        let mut builder = DispatchTable::builder();
        crate::dispatch::register_movement_handlers(&mut builder, Some(event_opcode)).unwrap();
        builder.build()
    }

    fn movement_payload() -> BytesMut {
        BytesMut::from(&[0xFFu8, 0xFF, 0xFF, 0xFF, 0x10, 0x20, 0x30][..])
    }

    #[test]
    fn test_patch_player_id() {
        let mut payload = [0u8; 6];
        patch_player_id(&mut payload, 0x0403_0201).unwrap();
        assert_eq!(payload, [1, 2, 3, 4, 0, 0]);

        let mut short = [9u8; 3];
        assert!(matches!(
            patch_player_id(&mut short, 1),
            Err(DispatchError::MalformedPacket { len: 3, required: 4 })
        ));
        assert_eq!(short, [9, 9, 9]);
    }

    #[test]
    fn test_movement_relay_excludes_sender_and_unloaded() {
        let mut s = scenario();
        let table = table((0x04, 0x08));

        let outcome = table.dispatch(&s.registry, &s.a, 0x04, 0x04, movement_payload());
        assert_eq!(outcome, DispatchOutcome::Handled);

        let relayed = s.rx_c.try_recv().unwrap();
        assert_eq!(relayed.opcode(), (0x04, 0x71));
        assert_eq!(relayed.flags, 0x40);
        assert_eq!(&relayed.payload[..4], &PLAYER_A.to_le_bytes());
        assert_eq!(&relayed.payload[4..], &[0x10, 0x20, 0x30]);

        assert!(s.rx_a.try_recv().is_err());
        assert!(s.rx_b.try_recv().is_err());
        assert!(s.rx_c.try_recv().is_err());
    }

    #[test]
    fn test_movement_end_is_alias() {
        let mut s = scenario();
        let table = table((0x04, 0x08));

        let outcome = table.dispatch(&s.registry, &s.a, 0x04, 0x71, movement_payload());
        assert_eq!(outcome, DispatchOutcome::Handled);

        let relayed = s.rx_c.try_recv().unwrap();
        assert_eq!(relayed.opcode(), (0x04, 0x71));
        assert_eq!(relayed.flags, 0x40);
        assert_eq!(&relayed.payload[..4], &PLAYER_A.to_le_bytes());
        assert!(s.rx_a.try_recv().is_err());
        assert!(s.rx_b.try_recv().is_err());
    }

    #[test]
    fn test_movement_event_reaches_sender_too() {
        let mut s = scenario();
        let table = table((0x04, 0x08));

        let outcome = table.dispatch(&s.registry, &s.a, 0x04, 0x08, movement_payload());
        assert_eq!(outcome, DispatchOutcome::Handled);

        for rx in [&mut s.rx_a, &mut s.rx_c] {
            let relayed = rx.try_recv().unwrap();
            assert_eq!(relayed.opcode(), (0x04, 0x80));
            assert_eq!(relayed.flags, 0x44);
            assert_eq!(&relayed.payload[..4], &PLAYER_A.to_le_bytes());
        }
        assert!(s.rx_b.try_recv().is_err());
    }

    #[test]
    fn test_short_payload_rejected_before_send() {
        let mut s = scenario();
        let table = table((0x04, 0x08));

        let outcome = table.dispatch(&s.registry, &s.a, 0x04, 0x04, BytesMut::from(&[1u8, 2, 3][..]));
        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert!(s.rx_a.try_recv().is_err());
        assert!(s.rx_b.try_recv().is_err());
        assert!(s.rx_c.try_recv().is_err());
        assert_eq!(table.stats().snapshot().relayed, 0);
    }

    #[test]
    fn test_failed_recipient_does_not_stop_fanout() {
        let registry = ConnectionRegistry::default();
        let (sender, _rx_sender) = registry.connect(1);
        let (gone, rx_gone) = registry.connect(2);
        let (alive, mut rx_alive) = registry.connect(3);
        gone.set_character(Some(2));
        alive.set_character(Some(3));
        drop(rx_gone);

        let report = RelayPolicy::EXCLUDE_SENDER.relay(
            &sender,
            &registry.all_connections(),
            Bytes::from_static(&[1, 0, 0, 0]),
        );

        assert_eq!(report, RelayReport { delivered: 1, failed: 1 });
        assert!(rx_alive.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_counts_as_failure() {
        let config = NetworkConfig::default().with_queue_capacity(1);
        let registry = ConnectionRegistry::new(&config);
        let (sender, _rx_sender) = registry.connect(1);
        let (slow, mut rx_slow) = registry.connect(2);
        let (fast, mut rx_fast) = registry.connect(3);
        slow.set_character(Some(2));
        fast.set_character(Some(3));

        let table = table((0x04, 0x08));
        slow.send(Packet::new(0x01, 0x01, 0, Bytes::new())).unwrap();
        let outcome = table.dispatch(&registry, &sender, 0x04, 0x04, movement_payload());
        assert_eq!(outcome, DispatchOutcome::Handled);

        let snapshot = table.stats().snapshot();
        assert_eq!(snapshot.relayed, 1);
        assert_eq!(snapshot.relay_failures, 1);
        assert_eq!(rx_slow.try_recv().unwrap().opcode(), (0x01, 0x01));
        assert!(rx_slow.try_recv().is_err());
        assert_eq!(rx_fast.try_recv().unwrap().opcode(), (0x04, 0x71));
    }

    #[test]
    fn test_relay_payload_is_a_copy() {
        let s = scenario();
        let original = Packet::new(0x04, 0x04, 0, vec![0xEEu8; 8]);
        let table = table((0x04, 0x08));

        table.dispatch_packet(&s.registry, &s.a, &original);
        assert_eq!(&original.payload[..], &[0xEE; 8]);
    }

    #[tokio::test]
    async fn test_relay_while_clients_churn() {
        let s = scenario();
        let table = std::sync::Arc::new(table((0x04, 0x08)));
        let mut tasks = Vec::new();

        for player in 0..8u32 {
            let registry = s.registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = registry.connect(100 + player);
                handle.set_character(Some(player + 1));
                tokio::task::yield_now().await;
                registry.disconnect(handle.id());
            }));
        }

        for _ in 0..8 {
            let outcome = table.dispatch(&s.registry, &s.a, 0x04, 0x04, movement_payload());
            assert_eq!(outcome, DispatchOutcome::Handled);
            tokio::task::yield_now().await;
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(table.stats().snapshot().handled, 8);
    }
}
